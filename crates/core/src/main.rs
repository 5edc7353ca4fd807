use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rpc_dt_config::Arguments;
use rpc_dt_core::{FATAL_EXIT_CODE, entry_point};

fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install the tracing subscriber: {error}");
    }

    let arguments = Arguments::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "Failed to build the tokio runtime");
            std::process::exit(FATAL_EXIT_CODE);
        }
    };

    let exit_code = runtime.block_on(async {
        match entry_point::run(&arguments).await {
            Ok(summary) => match entry_point::emit_report(&summary, &arguments.report()) {
                Ok(exit_code) => exit_code,
                Err(error) => {
                    error!("Failed to emit the report: {error:#}");
                    FATAL_EXIT_CODE
                }
            },
            Err(error) => {
                error!("{error}");
                error.exit_code()
            }
        }
    });
    drop(runtime);

    std::process::exit(exit_code);
}
