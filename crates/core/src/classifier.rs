//! Buckets the outcomes of a case into a classification.

use rpc_dt_format::policy::{EquivalencePolicy, Evaluation};
use rpc_dt_node_interaction::{CallOutcome, CallResponse};
use rpc_dt_report::Classification;

/// Classifies the outcomes of the two nodes for a case, returning a diagnostic for everything but a
/// plain match.
///
/// Transport failures on either side make the comparison inconclusive and always result in a
/// [`Classification::Flake`]. Errors are only compared by their code, and successful payloads are
/// compared using the case's policy.
pub fn classify(
    reference: &CallOutcome,
    candidate: &CallOutcome,
    policy: &EquivalencePolicy,
) -> (Classification, Option<String>) {
    if matches!(policy, EquivalencePolicy::AlwaysSkip) {
        return (
            Classification::Skipped,
            Some("policy is always_skip".to_string()),
        );
    }

    match (&reference.response, &candidate.response) {
        (CallResponse::TransportError(reference), CallResponse::TransportError(candidate)) => (
            Classification::Flake,
            Some(format!(
                "both nodes failed: reference: {reference}; candidate: {candidate}"
            )),
        ),
        (CallResponse::TransportError(error), _) => (
            Classification::Flake,
            Some(format!("reference failed: {error}")),
        ),
        (_, CallResponse::TransportError(error)) => (
            Classification::Flake,
            Some(format!("candidate failed: {error}")),
        ),
        (CallResponse::ApplicationError(reference), CallResponse::ApplicationError(candidate))
            if reference.code == candidate.code =>
        {
            (Classification::Match, None)
        }
        (CallResponse::ApplicationError(reference), CallResponse::ApplicationError(candidate)) => (
            Classification::Mismatch,
            Some(format!(
                "reference returned {reference} but candidate returned {candidate}"
            )),
        ),
        (CallResponse::ApplicationError(error), CallResponse::Success(_)) => (
            Classification::Mismatch,
            Some(format!("reference returned {error} but candidate succeeded")),
        ),
        (CallResponse::Success(_), CallResponse::ApplicationError(error)) => (
            Classification::Mismatch,
            Some(format!("reference succeeded but candidate returned {error}")),
        ),
        (CallResponse::Success(reference), CallResponse::Success(candidate)) => {
            match policy.evaluate(reference, candidate) {
                Evaluation::Equivalent => (Classification::Match, None),
                Evaluation::Divergent(divergence) => {
                    (Classification::Mismatch, Some(divergence.to_string()))
                }
                Evaluation::Skipped => (
                    Classification::Skipped,
                    Some("policy is always_skip".to_string()),
                ),
            }
        }
    }
}
