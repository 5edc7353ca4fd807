use std::ops::ControlFlow;

use rpc_dt_common::futures::{PollingWaitBehavior, poll};
use rpc_dt_config::ReadinessConfiguration;
use rpc_dt_node_interaction::CallResponse;
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{NodeHandle, ReadinessState};

/// The outcome of waiting for a node to become ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Polls the node's status method until it returns a non-null result or until the configured
/// timeout elapses.
///
/// Connection failures, malformed responses and JSON-RPC errors all mean that the node is not ready
/// yet. The handle is moved to [`ReadinessState::Ready`] or [`ReadinessState::Failed`] accordingly.
pub async fn await_ready(
    handle: &mut NodeHandle,
    configuration: &ReadinessConfiguration,
) -> Readiness {
    let attempt_timeout = handle
        .dispatcher()
        .configuration()
        .call_timeout
        .min(configuration.timeout);
    let span = info_span!(
        "Awaiting node readiness",
        role = %handle.endpoint().role,
        url = %handle.endpoint().url,
    );

    let result = {
        let handle = &*handle;
        poll(
            configuration.timeout,
            PollingWaitBehavior::Constant(configuration.poll_interval),
            move || async move {
                let response = handle
                    .dispatcher()
                    .call_once(
                        handle.endpoint(),
                        &configuration.status_method,
                        &[],
                        attempt_timeout,
                    )
                    .await;
                match response {
                    Ok(CallResponse::Success(Value::Null)) => {
                        debug!("Node returned an empty status");
                        ControlFlow::Continue(())
                    }
                    Ok(CallResponse::Success(_)) => ControlFlow::Break(()),
                    Ok(response) => {
                        debug!(%response, "Node is not ready yet");
                        ControlFlow::Continue(())
                    }
                    Err(error) => {
                        debug!("Node is not reachable yet: {error:#}");
                        ControlFlow::Continue(())
                    }
                }
            },
        )
        .instrument(span)
        .await
    };

    match result {
        Ok(()) => {
            info!(role = %handle.endpoint().role, "Node is ready");
            handle.set_readiness(ReadinessState::Ready);
            Readiness::Ready
        }
        Err(timeout) => {
            warn!(
                role = %handle.endpoint().role,
                attempts = timeout.attempts,
                elapsed = ?timeout.elapsed,
                "Node did not become ready in time"
            );
            handle.set_readiness(ReadinessState::Failed);
            Readiness::TimedOut
        }
    }
}
