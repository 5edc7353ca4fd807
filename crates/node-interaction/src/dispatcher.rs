use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context as _, Result, bail};
use reqwest::{Client, StatusCode};
use rpc_dt_config::{DispatchConfiguration, EndpointConfiguration};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{CallOutcome, CallResponse, JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse};

/// Sends JSON-RPC calls to nodes, applying the configured timeouts and retries.
///
/// Only transport failures are retried: connection errors, timeouts, `5xx` and `429` responses and
/// bodies that are not JSON-RPC. A node answering with a JSON-RPC error has answered, so the error
/// is returned right away.
#[derive(Clone, Debug)]
pub struct RequestDispatcher {
    client: Client,
    configuration: DispatchConfiguration,
    next_id: Arc<AtomicU64>,
}

impl RequestDispatcher {
    pub fn new(configuration: DispatchConfiguration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build the HTTP client")?;
        Ok(Self {
            client,
            configuration,
            next_id: Default::default(),
        })
    }

    pub fn configuration(&self) -> &DispatchConfiguration {
        &self.configuration
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(role = %endpoint.role, method = %method, timeout = ?timeout)
    )]
    pub async fn call(
        &self,
        endpoint: &EndpointConfiguration,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> CallOutcome {
        let timeout = timeout.unwrap_or(self.configuration.call_timeout);
        let mut delays = self.configuration.backoff.delays();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let error = match self.call_once(endpoint, method, params, timeout).await {
                Ok(response) => {
                    return CallOutcome {
                        origin: endpoint.role,
                        attempts,
                        response,
                    };
                }
                Err(error) => error,
            };

            let Some(delay) = delays.next() else {
                warn!(attempts, "Giving up on the call: {error:#}");
                return CallOutcome {
                    origin: endpoint.role,
                    attempts,
                    response: CallResponse::TransportError(format!("{error:#}")),
                };
            };
            debug!(attempts, ?delay, "Retrying the call after a transport failure: {error:#}");
            tokio::time::sleep(delay).await;
        }
    }

    /// Sends a single request without retrying. `Err` is only ever returned for transport
    /// failures.
    pub async fn call_once(
        &self,
        endpoint: &EndpointConfiguration,
        method: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<CallResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self
            .client
            .post(endpoint.url.clone())
            .timeout(timeout)
            .json(&JsonRpcRequest::new(id, method, params));
        if let Some(token) = endpoint.token.as_ref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send the request to {}", endpoint.url))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read the response body")?;
        let parsed = serde_json::from_slice::<JsonRpcResponse>(&body)
            .ok()
            .filter(|response| response.jsonrpc == JSONRPC_VERSION);

        match parsed {
            // Some nodes answer JSON-RPC errors with an error status.
            Some(response) if response.error.is_some() => Ok(response.into_call_response()),
            _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                bail!("The node responded with HTTP {status}")
            }
            Some(response) => Ok(response.into_call_response()),
            None => bail!(
                "The node responded with HTTP {status} and a body that's not JSON-RPC 2.0: {}",
                String::from_utf8_lossy(&body)
            ),
        }
    }
}
