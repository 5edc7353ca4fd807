//! The global configuration used across all RPC differential testing crates.
//!
//! The command line is parsed once into [`Arguments`] which is then split into one immutable
//! configuration value per component. Components only ever receive their own configuration value
//! which allows them to be driven from somewhere other than the command line.

use std::{fmt::Debug, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use reqwest::Url;
use rpc_dt_common::{futures::ExponentialBackoff, types::NodeRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Parser, Clone)]
#[command(name = "rpc-retester")]
pub struct Arguments {
    /// The JSON-RPC endpoint of the reference node.
    #[arg(long = "reference", default_value = "http://127.0.0.1:1234/rpc/v1")]
    pub reference_url: Url,

    /// The bearer token used to authenticate against the reference node.
    #[arg(long = "reference-token", env = "REFERENCE_RPC_TOKEN", hide_env_values = true)]
    pub reference_token: Option<String>,

    /// The JSON-RPC endpoint of the candidate node.
    #[arg(long = "candidate", default_value = "http://127.0.0.1:2345/rpc/v1")]
    pub candidate_url: Url,

    /// The bearer token used to authenticate against the candidate node.
    #[arg(long = "candidate-token", env = "CANDIDATE_RPC_TOKEN", hide_env_values = true)]
    pub candidate_token: Option<String>,

    /// The test catalog JSON file to run.
    #[arg(long = "catalog", short)]
    pub catalog: PathBuf,

    /// The maximum time in milliseconds for the whole comparison run. Cases that did not finish in
    /// time are reported as skipped.
    #[arg(long = "run-timeout")]
    pub run_timeout: Option<u64>,

    /// The default time in milliseconds a single RPC call may take.
    #[arg(long = "call-timeout", default_value = "30000")]
    pub call_timeout: u64,

    /// How many times a call is retried after a transport failure.
    #[arg(long = "retries", default_value = "2")]
    pub retries: u32,

    /// The wait in milliseconds before the first retry. Doubles on every further retry.
    #[arg(long = "retry-backoff", default_value = "500")]
    pub retry_backoff: u64,

    /// The maximum time in milliseconds to wait for each node to become ready.
    #[arg(long = "ready-timeout", default_value = "300000")]
    pub ready_timeout: u64,

    /// The time in milliseconds between two readiness checks.
    #[arg(long = "ready-poll-interval", default_value = "2000")]
    pub ready_poll_interval: u64,

    /// The RPC method used to check whether a node is ready.
    #[arg(long = "status-method", default_value = "Filecoin.ChainHead")]
    pub status_method: String,

    /// Treat flaky cases as failures.
    #[arg(long = "strict")]
    pub strict: bool,

    /// The format of the report printed to stdout.
    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Write the machine-readable report to this file in addition to stdout.
    #[arg(long = "report-file")]
    pub report_file: Option<PathBuf>,

    /// The maximum number of cases compared at the same time.
    #[arg(long = "workers", default_value = "8")]
    pub workers: usize,

    /// Only run cases whose method name contains this string. Case sensitive.
    #[arg(long = "filter", default_value = "")]
    pub filter: String,

    /// A file with one method filter per line. Lines starting with `!` reject methods, the others
    /// allow them. Empty lines and lines starting with `#` are ignored.
    #[arg(long = "filter-file")]
    pub filter_file: Option<PathBuf>,

    /// Stop scheduling cases after the first mismatch.
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Behavior for cases marked as ignored in the catalog.
    #[arg(long = "run-ignored", value_enum, default_value_t = RunIgnored::Default)]
    pub run_ignored: RunIgnored,
}

impl Arguments {
    pub fn endpoint(&self, role: NodeRole) -> EndpointConfiguration {
        match role {
            NodeRole::Reference => EndpointConfiguration {
                role,
                url: self.reference_url.clone(),
                token: self.reference_token.clone(),
            },
            NodeRole::Candidate => EndpointConfiguration {
                role,
                url: self.candidate_url.clone(),
                token: self.candidate_token.clone(),
            },
        }
    }

    pub fn dispatch(&self) -> DispatchConfiguration {
        DispatchConfiguration {
            call_timeout: Duration::from_millis(self.call_timeout),
            backoff: ExponentialBackoff::new(
                self.retries,
                Duration::from_millis(self.retry_backoff),
            ),
        }
    }

    pub fn readiness(&self) -> ReadinessConfiguration {
        ReadinessConfiguration {
            timeout: Duration::from_millis(self.ready_timeout),
            poll_interval: Duration::from_millis(self.ready_poll_interval),
            status_method: self.status_method.clone(),
        }
    }

    pub fn execution(&self) -> ExecutionConfiguration {
        ExecutionConfiguration {
            workers: self.workers.max(1),
            run_timeout: self.run_timeout.map(Duration::from_millis),
            fail_fast: self.fail_fast,
            run_ignored: self.run_ignored,
        }
    }

    pub fn report(&self) -> ReportConfiguration {
        ReportConfiguration {
            output_format: self.output_format,
            strict: self.strict,
            report_file: self.report_file.clone(),
        }
    }
}

/// Where a node can be reached and how to authenticate against it.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfiguration {
    pub role: NodeRole,
    pub url: Url,
    pub token: Option<String>,
}

impl EndpointConfiguration {
    pub fn new(role: NodeRole, url: Url) -> Self {
        Self {
            role,
            url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Debug for EndpointConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfiguration")
            .field("role", &self.role)
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Timeouts and retries applied to every RPC call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfiguration {
    /// The time a single attempt may take unless a case overrides it.
    pub call_timeout: Duration,
    /// The retry schedule used for transport failures.
    pub backoff: ExponentialBackoff,
}

impl Default for DispatchConfiguration {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            backoff: ExponentialBackoff::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessConfiguration {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub status_method: String,
}

impl Default for ReadinessConfiguration {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            status_method: "Filecoin.ChainHead".to_string(),
        }
    }
}

/// Controls how the comparison engine schedules the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionConfiguration {
    /// The maximum number of cases in flight at the same time.
    pub workers: usize,
    /// The time after which all remaining cases are abandoned.
    pub run_timeout: Option<Duration>,
    pub fail_fast: bool,
    pub run_ignored: RunIgnored,
}

impl Default for ExecutionConfiguration {
    fn default() -> Self {
        Self {
            workers: 8,
            run_timeout: None,
            fail_fast: false,
            run_ignored: RunIgnored::Default,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportConfiguration {
    pub output_format: OutputFormat,
    /// Flaky cases fail the run when set.
    pub strict: bool,
    pub report_file: Option<PathBuf>,
}

/// The format the final report is rendered in.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// A cargo-test-like listing followed by the full details of every mismatch.
    #[default]
    Human,
    /// A markdown table with one row per method and outcome combination.
    Markdown,
    /// The JSON report.
    Json,
}

/// What to do with cases that the catalog marks as ignored.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RunIgnored {
    /// Ignored cases are reported as skipped.
    #[default]
    Default,
    /// Only ignored cases are run, all other cases are left out of the run.
    IgnoredOnly,
    /// Ignored cases are run like any other case.
    All,
}
