//! A reporter event sent by the report aggregator to the various listeners.

use std::sync::Arc;

use crate::Verdict;

#[derive(Clone, Debug)]
pub enum ReporterEvent {
    /// Sent once a verdict and all the verdicts before it in catalog order are known. Listeners
    /// therefore observe the verdicts in catalog order.
    VerdictFinalized {
        verdict: Arc<Verdict>,
        /// How many verdicts have been finalized so far, this one included.
        finalized: usize,
        /// The number of cases in the run.
        total: usize,
    },
}
