//! The main entry point into a differential run.

use std::io::{BufWriter, Write, stderr};

use ansi_term::Color;
use anyhow::Context as _;
use rpc_dt_common::types::NodeRole;
use rpc_dt_config::{Arguments, OutputFormat, ReportConfiguration};
use rpc_dt_format::{catalog::Catalog, filter::FilterList};
use rpc_dt_node::{NodeHandle, Readiness, await_ready};
use rpc_dt_node_interaction::RequestDispatcher;
use rpc_dt_report::{ReportAggregator, ReporterEvent, RunSummary, render, status_line};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, instrument, warn};

use crate::{HarnessError, engine::ComparisonEngine};

/// Loads the catalog, waits for both nodes and compares them, returning the summary of the run.
///
/// Nothing is sent to either node before the catalog has been validated, and no case is dispatched
/// before both nodes have been found to be ready.
#[instrument(level = "info", err(Display), skip_all)]
pub async fn run(arguments: &Arguments) -> Result<RunSummary, HarnessError> {
    let catalog = Catalog::try_from_path(&arguments.catalog)?;
    let filter = match arguments.filter_file.as_deref() {
        Some(path) => FilterList::new_from_file(path)?,
        None if arguments.filter.is_empty() => FilterList::default(),
        None => FilterList::default().allow(arguments.filter.as_str()),
    };

    let dispatcher = RequestDispatcher::new(arguments.dispatch())?;
    let mut reference =
        NodeHandle::new(arguments.endpoint(NodeRole::Reference), dispatcher.clone());
    let mut candidate = NodeHandle::new(arguments.endpoint(NodeRole::Candidate), dispatcher);

    let readiness = arguments.readiness();
    let (reference_readiness, candidate_readiness) = tokio::join!(
        await_ready(&mut reference, &readiness),
        await_ready(&mut candidate, &readiness),
    );
    for (role, outcome) in [
        (NodeRole::Reference, reference_readiness),
        (NodeRole::Candidate, candidate_readiness),
    ] {
        if outcome == Readiness::TimedOut {
            return Err(HarnessError::ReadinessTimeout {
                role,
                timeout: readiness.timeout,
            });
        }
    }

    let engine =
        ComparisonEngine::new(reference, candidate, arguments.execution())?.with_filter(filter);

    let (reporter, aggregator) = ReportAggregator::new().into_task();
    let aggregator = tokio::spawn(aggregator);
    let cli_reporting_task = match arguments.output_format {
        OutputFormat::Human => {
            let events = reporter.subscribe().await?;
            Some(tokio::spawn(start_cli_reporting_task(events)))
        }
        OutputFormat::Markdown | OutputFormat::Json => None,
    };

    info!("Starting the comparison");
    engine.run(&catalog, &reporter).await;
    drop(reporter);

    let summary = aggregator
        .await
        .context("The report aggregator task failed")?
        .with_catalog_name(catalog.name.clone());
    if let Some(task) = cli_reporting_task {
        task.await.context("The CLI reporting task failed")?;
    }

    info!(
        total = summary.total,
        matched = summary.matched,
        mismatched = summary.mismatched,
        flaked = summary.flaked,
        skipped = summary.skipped,
        "Completed the comparison"
    );
    Ok(summary)
}

/// Prints the report to stdout, writes the report file when one is configured and returns the
/// process exit code of the run.
pub fn emit_report(
    summary: &RunSummary,
    configuration: &ReportConfiguration,
) -> anyhow::Result<i32> {
    let rendered = render(summary, configuration)?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(rendered.as_bytes())
        .and_then(|_| stdout.flush())
        .context("Failed to write the report to stdout")?;

    if let Some(path) = configuration.report_file.as_deref() {
        summary.write_to_file(path)?;
        info!(path = %path.display(), "Wrote the report file");
    }

    Ok(summary.exit_code(configuration.strict))
}

/// Streams the progress of the run to stderr as verdicts are finalized.
async fn start_cli_reporting_task(aggregator_events_rx: broadcast::Receiver<ReporterEvent>) {
    write_progress(aggregator_events_rx, BufWriter::new(stderr())).await
}

async fn write_progress(
    mut aggregator_events_rx: broadcast::Receiver<ReporterEvent>,
    mut buf: impl Write,
) {
    loop {
        let (verdict, finalized, total) = match aggregator_events_rx.recv().await {
            Ok(ReporterEvent::VerdictFinalized {
                verdict,
                finalized,
                total,
            }) => (verdict, finalized, total),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "The progress output fell behind, skipping verdicts");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let _ = writeln!(
            buf,
            "{} {}",
            Color::Cyan.paint(format!("[{finalized}/{total}]")),
            status_line(&verdict)
        );
        let _ = buf.flush();
    }
}
