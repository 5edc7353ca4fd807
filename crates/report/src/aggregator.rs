//! Implementation of the report aggregator task which consumes the verdicts sent by the comparison
//! engine and combines them into a single summary.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use rpc_dt_format::case::CaseIdx;
use tokio::sync::{
    broadcast::{Sender, channel},
    mpsc::{UnboundedReceiver, unbounded_channel},
};
use tracing::{debug, warn};

use crate::*;

/// The single owner of the run's verdicts.
///
/// Verdicts can arrive in any order. The aggregator holds them back until every verdict before them
/// in catalog order has arrived, so the summary and the broadcast events are always in catalog
/// order.
pub struct ReportAggregator {
    /* Internal Report State */
    expected: VecDeque<CaseIdx>,
    total: usize,
    pending: BTreeMap<CaseIdx, Verdict>,
    finalized: Vec<Verdict>,
    /* Channels */
    listener_tx: Sender<ReporterEvent>,
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAggregator {
    pub fn new() -> Self {
        let (listener_tx, _) = channel::<ReporterEvent>(0xFFFF);
        Self {
            expected: Default::default(),
            total: 0,
            pending: Default::default(),
            finalized: Default::default(),
            listener_tx,
        }
    }

    /// Returns the handle used to feed the aggregator and the future which drives it. The future
    /// resolves to the summary once the completion event has been received or every [`Reporter`]
    /// has been dropped.
    pub fn into_task(self) -> (Reporter, impl Future<Output = RunSummary>) {
        let (runner_tx, runner_rx) = unbounded_channel::<RunnerEvent>();
        (runner_tx.into(), self.aggregate(runner_rx))
    }

    async fn aggregate(mut self, mut runner_rx: UnboundedReceiver<RunnerEvent>) -> RunSummary {
        debug!("Starting to aggregate report");

        while let Some(event) = runner_rx.recv().await {
            debug!(event = event.variant_name(), "Received Event");
            match event {
                RunnerEvent::SubscribeToEvents { tx } => {
                    let _ = tx.send(self.listener_tx.subscribe());
                }
                RunnerEvent::RunStarted { cases } => self.handle_run_started(cases),
                RunnerEvent::Verdict(verdict) => self.handle_verdict(*verdict),
                RunnerEvent::Completion => break,
            }
        }
        self.handle_completion();
        debug!("Report aggregation completed");

        summarize(self.finalized)
    }

    fn handle_run_started(&mut self, cases: Vec<CaseIdx>) {
        self.total = cases.len();
        self.expected = cases.into();
        self.flush();
    }

    fn handle_verdict(&mut self, verdict: Verdict) {
        if let Some(previous) = self.pending.insert(verdict.case_idx, verdict) {
            warn!(case_idx = %previous.case_idx, "Received a second verdict for a case");
        }
        self.flush();
    }

    /// Finalizes every pending verdict whose predecessors have all been finalized.
    fn flush(&mut self) {
        while let Some(case_idx) = self.expected.front().copied() {
            let Some(verdict) = self.pending.remove(&case_idx) else {
                break;
            };
            self.expected.pop_front();
            self.finalize(verdict);
        }
    }

    fn handle_completion(&mut self) {
        if !self.expected.is_empty() {
            warn!(
                missing = self.expected.len(),
                "The run completed without a verdict for every case"
            );
        }
        self.expected.clear();
        for verdict in std::mem::take(&mut self.pending).into_values() {
            self.finalize(verdict);
        }
    }

    fn finalize(&mut self, verdict: Verdict) {
        self.finalized.push(verdict.clone());
        let _ = self.listener_tx.send(ReporterEvent::VerdictFinalized {
            verdict: Arc::new(verdict),
            finalized: self.finalized.len(),
            total: self.total.max(self.finalized.len()),
        });
    }
}
