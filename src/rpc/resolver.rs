//! Port-fallback resolution for node RPC calls.
//!
//! Nodes advertise their gossip port, but the RPC service may listen on
//! gossip+1, on the network default, or on the gossip port itself. The
//! resolver tries those candidates one at a time, in that order, and stops
//! at the first port that answers. Results are cached per `method:host`, so
//! the same host reached through different ports shares one cache slot.

use serde_json::Value;
use std::sync::Arc;

use super::RpcTransport;
use crate::cache::ResponseCache;

pub struct PortResolver {
    transport: Arc<dyn RpcTransport>,
    cache: Arc<ResponseCache>,
    default_rpc_port: u16,
}

/// Split `host:port`, `[v6]:port` or a bare host.
///
/// The port is `None` when absent or not a valid port number.
pub fn split_address(address: &str) -> (String, Option<u16>) {
    let address = address.trim();

    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse::<u16>().ok());
            return (host.to_string(), port);
        }
    }

    match address.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 literal
        Some((host, _)) if host.contains(':') => (address.to_string(), None),
        Some((host, port)) => (host.to_string(), port.parse::<u16>().ok()),
        None => (address.to_string(), None),
    }
}

/// Ordered candidate RPC ports: `[gossip + 1, default, gossip]`.
///
/// Zero and overflowing values are dropped; duplicates keep their first
/// position.
pub fn candidate_ports(gossip_port: Option<u16>, default_rpc_port: u16) -> Vec<u16> {
    let raw = [
        gossip_port.and_then(|p| p.checked_add(1)),
        Some(default_rpc_port),
        gossip_port,
    ];

    let mut ports = Vec::with_capacity(raw.len());
    for port in raw.into_iter().flatten() {
        if port > 0 && !ports.contains(&port) {
            ports.push(port);
        }
    }
    ports
}

impl PortResolver {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        cache: Arc<ResponseCache>,
        default_rpc_port: u16,
    ) -> Self {
        Self {
            transport,
            cache,
            default_rpc_port,
        }
    }

    /// Candidate ports for a gossip address
    pub fn candidates_for(&self, address: &str) -> Vec<u16> {
        let (_, gossip_port) = split_address(address);
        candidate_ports(gossip_port, self.default_rpc_port)
    }

    /// Call `method` on the node behind `address`.
    ///
    /// Served from the cache when fresh; otherwise the candidate ports are
    /// tried sequentially and the first answer is cached and returned. A
    /// total failure leaves any existing cache entry untouched.
    pub async fn resolve(&self, address: &str, method: &str) -> Option<Value> {
        let (host, gossip_port) = split_address(address);
        if host.is_empty() {
            return None;
        }

        let key = ResponseCache::key(method, &host);
        if let Some(cached) = self.cache.get(&key) {
            tracing::trace!("Cache hit for {}", key);
            return Some(cached);
        }

        for port in candidate_ports(gossip_port, self.default_rpc_port) {
            if let Some(result) = self.transport.call(&host, port, method).await {
                tracing::debug!("✓ {} answered {} on port {}", host, method, port);
                self.cache.set(key, result.clone());
                return Some(result);
            }
        }

        tracing::debug!("No RPC port answered {} for {}", method, address);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    fn resolver_with(transport: Arc<ScriptedTransport>) -> PortResolver {
        PortResolver::new(
            transport,
            Arc::new(ResponseCache::in_memory(TTL, 128)),
            6000,
        )
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address("1.2.3.4:9001"), ("1.2.3.4".into(), Some(9001)));
        assert_eq!(split_address("node.example"), ("node.example".into(), None));
        assert_eq!(split_address("1.2.3.4:abc"), ("1.2.3.4".into(), None));
        assert_eq!(split_address("[::1]:9001"), ("::1".into(), Some(9001)));
        assert_eq!(split_address("fe80::1"), ("fe80::1".into(), None));
    }

    #[test]
    fn test_candidate_ports() {
        assert_eq!(candidate_ports(Some(9001), 6000), vec![9002, 6000, 9001]);
        // gossip + 1 collides with the default
        assert_eq!(candidate_ports(Some(5999), 6000), vec![6000, 5999]);
        // gossip port equals the default
        assert_eq!(candidate_ports(Some(6000), 6000), vec![6001, 6000]);
        assert_eq!(candidate_ports(Some(0), 6000), vec![1, 6000]);
        assert_eq!(candidate_ports(Some(u16::MAX), 6000), vec![6000, u16::MAX]);
        assert_eq!(candidate_ports(None, 6000), vec![6000]);
        assert_eq!(candidate_ports(None, 0), Vec::<u16>::new());
    }

    #[tokio::test]
    async fn test_tries_ports_in_order_until_one_answers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("1.2.3.4", 9001, "get-stats", json!({"uptime": 42}));
        let resolver = resolver_with(transport.clone());

        let result = resolver.resolve("1.2.3.4:9001", "get-stats").await;
        assert_eq!(result, Some(json!({"uptime": 42})));
        assert_eq!(transport.calls_to("1.2.3.4"), vec![9002, 6000, 9001]);
    }

    #[tokio::test]
    async fn test_first_answer_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("1.2.3.4", 9002, "get-stats", json!({"uptime": 1}));
        transport.respond("1.2.3.4", 6000, "get-stats", json!({"uptime": 2}));
        let resolver = resolver_with(transport.clone());

        let result = resolver.resolve("1.2.3.4:9001", "get-stats").await;
        assert_eq!(result, Some(json!({"uptime": 1})));
        assert_eq!(transport.calls_to("1.2.3.4"), vec![9002]);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("1.2.3.4", 9002, "get-stats", json!({"uptime": 1}));
        let resolver = resolver_with(transport.clone());

        resolver.resolve("1.2.3.4:9001", "get-stats").await;
        let calls_after_first = transport.call_count();

        // The node would now answer differently; the cached value still wins
        transport.respond("1.2.3.4", 9002, "get-stats", json!({"uptime": 999}));
        let second = resolver.resolve("1.2.3.4:9001", "get-stats").await;

        assert_eq!(second, Some(json!({"uptime": 1})));
        assert_eq!(transport.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn test_cache_slot_is_per_host_not_port() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("1.2.3.4", 9002, "get-stats", json!({"uptime": 1}));
        let resolver = resolver_with(transport.clone());

        resolver.resolve("1.2.3.4:9001", "get-stats").await;
        let second = resolver.resolve("1.2.3.4:7000", "get-stats").await;

        assert_eq!(second, Some(json!({"uptime": 1})));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_fresh_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("1.2.3.4", 9002, "get-stats", json!({"uptime": 2}));
        let resolver = resolver_with(transport.clone());

        let stale = chrono::Utc::now().timestamp_millis() - 61_000;
        resolver.cache.insert_at(
            ResponseCache::key("get-stats", "1.2.3.4"),
            json!({"uptime": 1}),
            stale,
        );

        let result = resolver.resolve("1.2.3.4:9001", "get-stats").await;
        assert_eq!(result, Some(json!({"uptime": 2})));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_keeps_cache_untouched() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(ResponseCache::in_memory(TTL, 128));
        let resolver = PortResolver::new(transport.clone(), cache.clone(), 6000);

        let stale = chrono::Utc::now().timestamp_millis() - 61_000;
        let key = ResponseCache::key("get-stats", "1.2.3.4");
        cache.insert_at(key.clone(), json!({"uptime": 1}), stale);

        assert_eq!(resolver.resolve("1.2.3.4:9001", "get-stats").await, None);
        assert_eq!(transport.call_count(), 3);
        let entry = cache.entry(&key).unwrap();
        assert_eq!(entry.timestamp, stale);
        assert_eq!(entry.data, json!({"uptime": 1}));
    }

    #[tokio::test]
    async fn test_address_without_port_uses_default_only() {
        let transport = Arc::new(ScriptedTransport::new());
        let resolver = resolver_with(transport.clone());

        assert_eq!(resolver.resolve("node.example", "get-version").await, None);
        assert_eq!(transport.calls_to("node.example"), vec![6000]);
        assert_eq!(resolver.resolve("", "get-version").await, None);
        assert_eq!(transport.call_count(), 1);
    }
}
