//! Single-shot JSON-RPC calls to pNode RPC services.
//!
//! Every call opens its own connection, posts one request envelope to
//! `/rpc` and waits at most the configured timeout. All failure modes
//! (refused, timeout, non-2xx, undecodable body, `error` field) collapse
//! into `None`; retrying is the caller's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::constants::rpc::{JSONRPC_VERSION, REQUEST_ID, RPC_PATH};

/// Issues one RPC call to one `(host, port)` pair.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Returns the `result` payload, or `None` on any failure.
    async fn call(&self, host: &str, port: u16, method: &str) -> Option<Value>;
}

#[derive(Serialize, Debug)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'a str,
    pub method: &'a str,
    pub id: u64,
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcResponse {
    /// Unwrap the envelope: a non-null `error` or a null `result` is no result.
    pub fn into_result(self) -> Option<Value> {
        if self.error.as_ref().is_some_and(|e| !e.is_null()) {
            return None;
        }
        self.result.filter(|r| !r.is_null())
    }
}

/// Build the RPC URL for a host, bracketing bare IPv6 literals.
pub fn rpc_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}{}", host, port, RPC_PATH)
    } else {
        format!("http://{}:{}{}", host, port, RPC_PATH)
    }
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build RPC client ({}), using defaults", e);
                reqwest::Client::new()
            });

        Self { client, timeout }
    }

    async fn post(&self, url: &str, method: &str) -> Result<RpcResponse, String> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            id: REQUEST_ID,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| format!("Parse error: {}", e))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, host: &str, port: u16, method: &str) -> Option<Value> {
        let url = rpc_url(host, port);

        match tokio::time::timeout(self.timeout, self.post(&url, method)).await {
            Ok(Ok(response)) => {
                let result = response.into_result();
                if result.is_none() {
                    tracing::debug!("RPC {} on {}:{} returned no result", method, host, port);
                }
                result
            }
            Ok(Err(e)) => {
                tracing::debug!("RPC {} on {}:{} failed: {}", method, host, port, e);
                None
            }
            Err(_) => {
                tracing::debug!(
                    "⏱️  RPC {} on {}:{} timed out after {:?}",
                    method,
                    host,
                    port,
                    self.timeout
                );
                None
            }
        }
    }
}
