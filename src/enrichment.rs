//! Stats enrichment for discovered nodes.
//!
//! Only the first `limit` records of a batch are asked for stats, bounding
//! the RPC fan-out per pass. Selected nodes are queried concurrently through
//! the port-fallback resolver; a node that does not answer before the batch
//! deadline simply stays unenriched.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::rpc::PortResolver;
use crate::types::{EnrichedRecord, NodeRecord, NodeStats};

/// Upper bound on candidate ports per node (gossip+1, default, gossip)
const MAX_CANDIDATE_PORTS: u32 = 3;

pub struct StatsEnricher {
    resolver: Arc<PortResolver>,
    stats_method: String,
    /// When set, nodes that reported no version are asked for it
    version_method: Option<String>,
    per_call_timeout: Duration,
}

impl StatsEnricher {
    pub fn new(
        resolver: Arc<PortResolver>,
        stats_method: impl Into<String>,
        per_call_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            stats_method: stats_method.into(),
            version_method: None,
            per_call_timeout,
        }
    }

    /// Also fill empty `version` fields using `method`
    pub fn with_version_fill(mut self, method: impl Into<String>) -> Self {
        self.version_method = Some(method.into());
        self
    }

    /// Deadline for a whole batch: every selected node may need every
    /// candidate port to time out.
    pub fn batch_timeout(&self, limit: usize) -> Duration {
        let per_node = self.per_call_timeout * MAX_CANDIDATE_PORTS;
        let nodes = u32::try_from(limit.max(1)).unwrap_or(u32::MAX);
        per_node.saturating_mul(nodes)
    }

    /// Enrich the first `limit` records; the rest pass through untouched.
    ///
    /// Output keeps the input order.
    pub async fn enrich(&self, records: Vec<NodeRecord>, limit: usize) -> Vec<EnrichedRecord> {
        let mut selected = records;
        let limit = limit.min(selected.len());
        let passthrough = selected.split_off(limit);

        if selected.is_empty() {
            return passthrough
                .into_iter()
                .map(EnrichedRecord::unenriched)
                .collect();
        }

        let deadline = Instant::now() + self.batch_timeout(limit);
        let enriched = join_all(
            selected
                .into_iter()
                .map(|record| self.enrich_one(record, deadline)),
        )
        .await;

        let hits = enriched.iter().filter(|r| r.is_enriched()).count();
        tracing::info!(
            "📊 Enriched {}/{} nodes ({} passed through)",
            hits,
            limit,
            passthrough.len()
        );

        enriched
            .into_iter()
            .chain(passthrough.into_iter().map(EnrichedRecord::unenriched))
            .collect()
    }

    async fn enrich_one(&self, mut record: NodeRecord, deadline: Instant) -> EnrichedRecord {
        let address = record.address.clone();

        let stats = match tokio::time::timeout_at(
            deadline,
            self.resolver.resolve(&address, &self.stats_method),
        )
        .await
        {
            Ok(payload) => payload.and_then(|payload| NodeStats::from_payload(&payload)),
            Err(_) => {
                tracing::debug!("⏱️  Stats for {} missed the batch deadline", address);
                None
            }
        };
        if stats.is_none() {
            tracing::debug!("No stats for {}, keeping discovery record", address);
        }

        // Version fill gets whatever is left of the deadline
        if let (Some(method), true) = (&self.version_method, record.version.is_empty()) {
            match tokio::time::timeout_at(deadline, self.resolver.resolve(&address, method)).await {
                Ok(payload) => {
                    if let Some(version) = payload.and_then(|payload| parse_version(&payload)) {
                        record.version = version;
                    }
                }
                Err(_) => {
                    tracing::debug!("⏱️  Version for {} missed the batch deadline", address);
                }
            }
        }

        EnrichedRecord { record, stats }
    }
}

/// Accepts `"1.2.3"` or `{ "version": "1.2.3" }`
fn parse_version(payload: &serde_json::Value) -> Option<String> {
    let version = match payload {
        serde_json::Value::String(v) => v.as_str(),
        serde_json::Value::Object(map) => map.get("version")?.as_str()?,
        _ => return None,
    };
    let version = version.trim();
    (!version.is_empty()).then(|| version.to_string())
}
