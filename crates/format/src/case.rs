use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rpc_dt_common::macros::define_wrapper_type;

use crate::policy::EquivalencePolicy;

/// A single RPC call that's sent to both nodes and whose responses are compared.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub method: String,

    #[serde(default)]
    pub params: Vec<Value>,

    #[serde(default)]
    pub policy: EquivalencePolicy,

    /// When set the case is not dispatched and the reason is reported instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,

    /// Overrides the default call timeout for this case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TestCase {
    pub fn new(method: impl Into<String>, params: Vec<Value>, policy: EquivalencePolicy) -> Self {
        Self {
            method: method.into(),
            params,
            policy,
            ..Default::default()
        }
    }

    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignore = Some(reason.into());
        self
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The reason this case is never dispatched, regardless of how ignored cases are handled.
    pub fn always_skipped(&self) -> Option<&'static str> {
        matches!(self.policy, EquivalencePolicy::AlwaysSkip).then_some("policy is always_skip")
    }
}

define_wrapper_type!(
    /// The position of a case in its catalog. Verdicts are reported in this order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CaseIdx(usize) impl Display;
);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn omitted_fields_take_their_defaults() {
        let case: TestCase =
            serde_json::from_value(json!({ "method": "Filecoin.ChainHead" })).unwrap();

        assert_eq!(case.params, Vec::<Value>::new());
        assert_eq!(case.policy, EquivalencePolicy::ExactMatch);
        assert!(!case.is_ignored());
        assert_eq!(case.timeout(), None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<TestCase>(json!({
            "method": "Filecoin.ChainHead",
            "polcy": "exact_match"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn timeout_override_is_in_milliseconds() {
        let case: TestCase = serde_json::from_value(json!({
            "method": "Filecoin.NetPeers",
            "timeout_ms": 5000
        }))
        .unwrap();
        assert_eq!(case.timeout(), Some(Duration::from_secs(5)));
    }
}
