//! Node discovery through a fixed list of seed hosts.
//!
//! Every seed is asked for its view of the node population on the
//! discovery method, all seeds at once. A seed that fails, times out or
//! returns nothing usable contributes an empty list; one unreachable seed
//! never fails the pass. The per-seed lists are merged by address, keeping
//! the sighting with the greatest `last_seen_at` (first seen wins ties).

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::rpc::resolver::split_address;
use crate::rpc::RpcTransport;
use crate::types::{parse_pods, NodeRecord};

/// A seed endpoint; seeds are queried on a known port, without fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Outcome of one discovery pass, for status tracking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub seeds_queried: usize,
    pub seeds_responding: usize,
    pub sightings: usize,
    pub unique_nodes: usize,
}

pub struct NodeDiscovery {
    transport: Arc<dyn RpcTransport>,
    seeds: Vec<Seed>,
    method: String,
}

impl NodeDiscovery {
    /// Create a discovery service.
    ///
    /// Each seed is `host` or `host:port`; seeds without a port use
    /// `default_port`. Blank entries are skipped.
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        seeds: &[String],
        default_port: u16,
        method: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            seeds: parse_seed_list(seeds, default_port),
            method: method.into(),
        }
    }

    pub fn seeds(&self) -> &[Seed] {
        &self.seeds
    }

    /// Discover the node population, deduplicated by address.
    ///
    /// Order of the result follows first sighting; callers must not rely
    /// on it.
    pub async fn discover_all(&self) -> Vec<NodeRecord> {
        self.discover_with_report().await.0
    }

    /// Like [`discover_all`](Self::discover_all) but returns an empty list,
    /// without error, if `token` is cancelled before the seeds answer.
    pub async fn discover_all_cancellable(&self, token: &CancellationToken) -> Vec<NodeRecord> {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Discovery pass cancelled");
                Vec::new()
            }
            (records, _) = self.discover_with_report() => records,
        }
    }

    /// Run one pass and report how many seeds answered.
    pub async fn discover_with_report(&self) -> (Vec<NodeRecord>, DiscoveryReport) {
        if self.seeds.is_empty() {
            tracing::warn!("⚠️ No seed hosts configured, discovery returns nothing");
            return (Vec::new(), DiscoveryReport::default());
        }

        let per_seed = join_all(self.seeds.iter().map(|seed| self.query_seed(seed))).await;

        let seeds_responding = per_seed.iter().filter(|r| r.is_some()).count();
        let sightings: Vec<NodeRecord> = per_seed.into_iter().flatten().flatten().collect();
        let sighting_count = sightings.len();
        let merged = merge_sightings(sightings);

        let report = DiscoveryReport {
            seeds_queried: self.seeds.len(),
            seeds_responding,
            sightings: sighting_count,
            unique_nodes: merged.len(),
        };

        tracing::info!(
            "🔍 Discovery: {}/{} seeds answered, {} sightings, {} unique nodes",
            report.seeds_responding,
            report.seeds_queried,
            report.sightings,
            report.unique_nodes
        );

        (merged, report)
    }

    /// `None` when the seed gave no usable payload
    async fn query_seed(&self, seed: &Seed) -> Option<Vec<NodeRecord>> {
        let payload = self
            .transport
            .call(&seed.host, seed.port, &self.method)
            .await?;

        let records = parse_pods(&payload);
        if records.is_empty() && !is_empty_listing(&payload) {
            tracing::debug!("Seed {} returned an unusable {} payload", seed, self.method);
            return None;
        }

        tracing::debug!("Seed {} reported {} nodes", seed, records.len());
        Some(records)
    }
}

/// An explicitly empty listing still counts as a responding seed.
fn is_empty_listing(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map
            .get("pods")
            .and_then(|p| p.as_array())
            .is_some_and(|p| p.is_empty()),
        _ => false,
    }
}

/// Parse a list of seed addresses (host or host:port format)
pub fn parse_seed_list(seeds: &[String], default_port: u16) -> Vec<Seed> {
    let mut parsed: Vec<Seed> = Vec::with_capacity(seeds.len());

    for entry in seeds {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (host, port) = split_address(entry);
        if host.is_empty() {
            tracing::debug!("🚫 Filtered invalid seed entry: {}", entry);
            continue;
        }

        let seed = Seed {
            host,
            port: port.unwrap_or(default_port),
        };
        if !parsed.contains(&seed) {
            parsed.push(seed);
        }
    }

    parsed
}

/// Merge sightings into one record per address.
///
/// A later sighting replaces the kept one only when its `last_seen_at` is
/// strictly greater, so exact ties keep the first sighting.
pub fn merge_sightings(sightings: impl IntoIterator<Item = NodeRecord>) -> Vec<NodeRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<NodeRecord> = Vec::new();

    for record in sightings {
        match index.get(&record.address) {
            Some(&slot) => {
                if record.last_seen_at > merged[slot].last_seen_at {
                    merged[slot] = record;
                }
            }
            None => {
                index.insert(record.address.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}
