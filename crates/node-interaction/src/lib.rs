//! This crate implements all node interactions.

use std::time::Duration;

use rpc_dt_common::types::NodeRole;
use serde_json::Value;

mod dispatcher;
mod jsonrpc;

pub use dispatcher::*;
pub use jsonrpc::*;

/// An interface for all interactions with a node taking part in a differential run.
pub trait RpcNode {
    /// The role this node plays in the run.
    fn role(&self) -> NodeRole;

    /// Whether the readiness check found the node to be ready. Calls must only be sent to ready
    /// nodes.
    fn is_ready(&self) -> bool;

    /// Sends the call to the node and returns its outcome. Failures are part of the outcome and are
    /// never returned as errors. A `timeout` of [`None`] uses the node's default call timeout.
    fn call(
        &self,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> impl Future<Output = CallOutcome> + Send;
}
