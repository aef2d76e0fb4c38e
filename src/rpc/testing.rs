//! Scripted in-process transport for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::RpcTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub host: String,
    pub port: u16,
    pub method: String,
}

/// Answers from a fixed table keyed by `(host, port, method)` and records
/// every call it receives, in order.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<(String, u16, String), Value>>,
    delays: Mutex<HashMap<String, Duration>>,
    method_delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, host: &str, port: u16, method: &str, value: Value) {
        self.responses
            .lock()
            .insert((host.to_string(), port, method.to_string()), value);
    }

    pub fn forget(&self, host: &str, port: u16, method: &str) {
        self.responses
            .lock()
            .remove(&(host.to_string(), port, method.to_string()));
    }

    /// Delay every answer from `host` (used to simulate stalled nodes).
    pub fn delay_host(&self, host: &str, delay: Duration) {
        self.delays.lock().insert(host.to_string(), delay);
    }

    /// Delay every answer to `method`, on any host.
    pub fn delay_method(&self, method: &str, delay: Duration) {
        self.method_delays.lock().insert(method.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, host: &str) -> Vec<u16> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.host == host)
            .map(|c| c.port)
            .collect()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, host: &str, port: u16, method: &str) -> Option<Value> {
        self.calls.lock().push(RecordedCall {
            host: host.to_string(),
            port,
            method: method.to_string(),
        });

        let host_delay = self.delays.lock().get(host).copied();
        let delay = host_delay.or_else(|| self.method_delays.lock().get(method).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .get(&(host.to_string(), port, method.to_string()))
            .cloned()
    }
}
