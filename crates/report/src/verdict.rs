use rpc_dt_format::case::{CaseIdx, TestCase};
use rpc_dt_node_interaction::CallOutcome;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The bucket a verdict falls in.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    /// Both nodes agree under the case's policy.
    Match,
    /// The case was not compared.
    Skipped,
    /// The comparison was inconclusive because a node could not be reached.
    Flake,
    /// The nodes disagree.
    Mismatch,
}

/// The final result of a single case. Verdicts are never mutated once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub case_idx: CaseIdx,
    pub case: TestCase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<CallOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CallOutcome>,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Verdict {
    pub fn compared(
        case_idx: CaseIdx,
        case: TestCase,
        reference: CallOutcome,
        candidate: CallOutcome,
        classification: Classification,
        diagnostic: Option<String>,
    ) -> Self {
        Self {
            case_idx,
            case,
            reference: Some(reference),
            candidate: Some(candidate),
            classification,
            diagnostic,
        }
    }

    /// A verdict for a case that was never dispatched.
    pub fn skipped(case_idx: CaseIdx, case: TestCase, reason: impl Into<String>) -> Self {
        Self {
            case_idx,
            case,
            reference: None,
            candidate: None,
            classification: Classification::Skipped,
            diagnostic: Some(reason.into()),
        }
    }

    pub fn method(&self) -> &str {
        &self.case.method
    }
}
