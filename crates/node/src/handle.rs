use std::time::Duration;

use rpc_dt_common::types::NodeRole;
use rpc_dt_config::EndpointConfiguration;
use rpc_dt_node_interaction::{CallOutcome, RequestDispatcher, RpcNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// Whether a node has been found to be able to serve calls.
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
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadinessState {
    #[default]
    Pending,
    Ready,
    Failed,
}

/// A handle over one running node endpoint.
///
/// The handle is created [`ReadinessState::Pending`] and only the readiness check moves it to
/// another state. After the check has run the handle is never mutated again and can be shared
/// freely between concurrent cases.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    endpoint: EndpointConfiguration,
    readiness: ReadinessState,
    dispatcher: RequestDispatcher,
}

impl NodeHandle {
    pub fn new(endpoint: EndpointConfiguration, dispatcher: RequestDispatcher) -> Self {
        Self {
            endpoint,
            readiness: ReadinessState::Pending,
            dispatcher,
        }
    }

    pub fn endpoint(&self) -> &EndpointConfiguration {
        &self.endpoint
    }

    pub fn readiness(&self) -> ReadinessState {
        self.readiness
    }

    pub(crate) fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub(crate) fn set_readiness(&mut self, readiness: ReadinessState) {
        self.readiness = readiness
    }
}

impl RpcNode for NodeHandle {
    fn role(&self) -> NodeRole {
        self.endpoint.role
    }

    fn is_ready(&self) -> bool {
        self.readiness == ReadinessState::Ready
    }

    fn call(
        &self,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> impl Future<Output = CallOutcome> + Send {
        self.dispatcher.call(&self.endpoint, method, params, timeout)
    }
}
