use std::fmt::Display;

use rpc_dt_common::types::NodeRole;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Clone, Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a [Value]) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn into_call_response(self) -> CallResponse {
        match self.error {
            Some(error) => CallResponse::ApplicationError(error),
            None => CallResponse::Success(self.result),
        }
    }
}

/// A well formed JSON-RPC error returned by a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)?;
        if let Some(data) = self.data.as_ref() {
            write!(f, " ({data})")?;
        }
        Ok(())
    }
}

/// The result of sending a single call to a single node, retries included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub origin: NodeRole,
    /// The number of requests sent, including the retries.
    pub attempts: u32,
    pub response: CallResponse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResponse {
    Success(Value),
    ApplicationError(RpcError),
    /// The node could not be reached or didn't respond with JSON-RPC, even after retrying.
    TransportError(String),
}

impl CallResponse {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

impl Display for CallResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(value) => write!(f, "{value}"),
            Self::ApplicationError(error) => write!(f, "{error}"),
            Self::TransportError(description) => write!(f, "transport error: {description}"),
        }
    }
}
