//! Refresh loop tying discovery and enrichment together.
//!
//! One pass discovers the population, orders it for display (freshest
//! first), enriches the first `limit` nodes and publishes the result as a
//! [`Snapshot`]. Alongside the nodes the collector tracks how discovery has
//! been going, so the presentation layer can tell "nothing found yet" from
//! "nothing is up".

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::write_atomically;
use crate::discovery::{DiscoveryReport, NodeDiscovery};
use crate::enrichment::StatsEnricher;
use crate::error::AppResult;
use crate::types::EnrichedRecord;

/// Discovery attempt bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStatus {
    pub attempts: u64,
    /// Passes that found at least one node
    pub successful_attempts: u64,
    pub last_attempt_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub last_node_count: usize,
    pub last_seeds_queried: usize,
    pub last_seeds_responding: usize,
}

impl DiscoveryStatus {
    fn record(&mut self, report: &DiscoveryReport, at: i64) {
        self.attempts += 1;
        self.last_attempt_at = Some(at);
        self.last_node_count = report.unique_nodes;
        self.last_seeds_queried = report.seeds_queried;
        self.last_seeds_responding = report.seeds_responding;

        if report.unique_nodes > 0 {
            self.successful_attempts += 1;
            self.last_success_at = Some(at);
        }
    }
}

/// What the presentation layer consumes
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: Option<i64>,
    pub nodes: Vec<EnrichedRecord>,
    pub status: DiscoveryStatus,
}

pub struct Collector {
    discovery: NodeDiscovery,
    enricher: StatsEnricher,
    limit: usize,
    output_path: Option<PathBuf>,
    latest: RwLock<Snapshot>,
}

impl Collector {
    pub fn new(discovery: NodeDiscovery, enricher: StatsEnricher, limit: usize) -> Self {
        Self {
            discovery,
            enricher,
            limit,
            output_path: None,
            latest: RwLock::new(Snapshot::default()),
        }
    }

    /// Write every new snapshot to `path` as pretty JSON
    pub fn with_output(mut self, path: Option<PathBuf>) -> Self {
        self.output_path = path;
        self
    }

    pub fn discovery(&self) -> &NodeDiscovery {
        &self.discovery
    }

    pub fn snapshot(&self) -> Snapshot {
        self.latest.read().clone()
    }

    pub fn status(&self) -> DiscoveryStatus {
        self.latest.read().status.clone()
    }

    /// Run one discover → order → enrich pass and publish it.
    pub async fn refresh(&self) -> Snapshot {
        self.refresh_with_limit(self.limit).await
    }

    pub async fn refresh_with_limit(&self, limit: usize) -> Snapshot {
        let attempted_at = Utc::now().timestamp();
        let (mut nodes, report) = self.discovery.discover_with_report().await;

        // Display order: freshest first (stable, so ties keep discovery order)
        nodes.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        let nodes = self.enricher.enrich(nodes, limit).await;

        let mut latest = self.latest.write();
        latest.status.record(&report, attempted_at);
        latest.nodes = nodes;
        latest.generated_at = Some(Utc::now().timestamp());
        latest.clone()
    }

    /// Refresh now and then every `interval` until `token` is cancelled.
    ///
    /// A pass still running at cancellation is abandoned.
    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("🛑 Refresh pass abandoned on shutdown");
                    break;
                }
                snapshot = self.refresh() => snapshot,
            };

            if snapshot.status.last_node_count == 0 {
                tracing::warn!(
                    "⚠️ No nodes discovered ({}/{} seeds answered)",
                    snapshot.status.last_seeds_responding,
                    snapshot.status.last_seeds_queried
                );
            }

            if let Err(e) = self.write_snapshot(&snapshot) {
                tracing::warn!("Failed to write snapshot: {}", e);
            }
        }

        tracing::debug!("Collector loop stopped");
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> AppResult<()> {
        let Some(path) = self.output_path.as_ref() else {
            return Ok(());
        };
        let contents = serde_json::to_vec_pretty(snapshot)?;
        write_atomically(path, &contents)?;
        tracing::debug!("Snapshot with {} nodes written to {}", snapshot.nodes.len(), path.display());
        Ok(())
    }
}
