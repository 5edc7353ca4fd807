//! The events sent by the comparison engine to the report aggregator.

use anyhow::Context as _;
use rpc_dt_format::case::CaseIdx;
use tokio::sync::{broadcast, mpsc::UnboundedSender, oneshot};

use crate::{ReporterEvent, Verdict};

#[derive(Debug)]
pub enum RunnerEvent {
    /// Asks the aggregator for a receiver of the events it broadcasts.
    SubscribeToEvents {
        tx: oneshot::Sender<broadcast::Receiver<ReporterEvent>>,
    },
    /// The cases that are part of the run, in catalog order. Sent once before any verdict.
    RunStarted { cases: Vec<CaseIdx> },
    /// A case has been decided.
    Verdict(Box<Verdict>),
    /// No more events will be sent.
    Completion,
}

impl RunnerEvent {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::SubscribeToEvents { .. } => "SubscribeToEvents",
            Self::RunStarted { .. } => "RunStarted",
            Self::Verdict(_) => "Verdict",
            Self::Completion => "Completion",
        }
    }
}

/// The handle through which the engine talks to the report aggregator. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Reporter(UnboundedSender<RunnerEvent>);

impl From<UnboundedSender<RunnerEvent>> for Reporter {
    fn from(value: UnboundedSender<RunnerEvent>) -> Self {
        Self(value)
    }
}

impl Reporter {
    fn report(&self, event: RunnerEvent) -> anyhow::Result<()> {
        self.0
            .send(event)
            .map_err(|_| anyhow::anyhow!("The report aggregator is no longer running"))
    }

    pub fn report_run_started_event(&self, cases: Vec<CaseIdx>) -> anyhow::Result<()> {
        self.report(RunnerEvent::RunStarted { cases })
    }

    pub fn report_verdict_event(&self, verdict: Verdict) -> anyhow::Result<()> {
        self.report(RunnerEvent::Verdict(Box::new(verdict)))
    }

    pub fn report_completion_event(&self) -> anyhow::Result<()> {
        self.report(RunnerEvent::Completion)
    }

    pub async fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<ReporterEvent>> {
        let (tx, rx) = oneshot::channel::<broadcast::Receiver<ReporterEvent>>();
        self.report(RunnerEvent::SubscribeToEvents { tx })
            .context("Failed to send subscribe request to reporter task")?;
        rx.await.map_err(Into::into)
    }
}
