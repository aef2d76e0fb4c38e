//! Node data model shared by discovery, enrichment and the collector.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One sighting of a pNode as reported by a seed.
///
/// `address` is the gossip endpoint (`host:port`) and the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PodEntry")]
pub struct NodeRecord {
    pub address: String,
    pub pubkey: Option<String>,
    pub version: String,
    pub last_seen_at: i64,
}

impl NodeRecord {
    pub fn new(address: impl Into<String>, last_seen_at: i64) -> Self {
        Self {
            address: address.into(),
            pubkey: None,
            version: String::new(),
            last_seen_at,
        }
    }
}

/// A pod entry as seeds put it on the wire.
///
/// Seeds disagree on key spelling and some send several freshness keys at
/// once, so every spelling gets its own slot and [`NodeRecord`] picks one.
#[derive(Deserialize)]
struct PodEntry {
    address: String,
    #[serde(default)]
    pubkey: Option<String>,
    #[serde(default, rename = "pubKey")]
    pub_key: Option<String>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    last_seen_timestamp: Option<Value>,
    #[serde(default, rename = "lastSeenAt")]
    last_seen_at_camel: Option<Value>,
    #[serde(default)]
    last_seen_at: Option<Value>,
    #[serde(default)]
    last_seen: Option<Value>,
}

impl From<PodEntry> for NodeRecord {
    fn from(entry: PodEntry) -> Self {
        // First integer wins; human-readable strings are ignored
        let last_seen_at = [
            &entry.last_seen_timestamp,
            &entry.last_seen_at_camel,
            &entry.last_seen_at,
            &entry.last_seen,
        ]
        .into_iter()
        .flatten()
        .find_map(as_timestamp)
        .unwrap_or_default();

        Self {
            address: entry.address,
            pubkey: entry.pubkey.or(entry.pub_key),
            version: entry
                .version
                .as_ref()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_seen_at,
        }
    }
}

fn as_timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Extract node records from a seed's discovery payload.
///
/// Accepts `{ "pods": [...] }` or a bare array. Entries that do not decode,
/// or that carry an empty address, are skipped individually.
pub fn parse_pods(payload: &Value) -> Vec<NodeRecord> {
    let entries = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("pods") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<NodeRecord>(entry.clone()).ok())
        .filter(|record| !record.address.trim().is_empty())
        .collect()
}

/// Point-in-time operational statistics of a single node.
///
/// Known counters are typed; any other numeric field the node reports is
/// kept in `extra` under its original name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_streams: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl NodeStats {
    /// Build stats from a `get-stats` result.
    ///
    /// Returns `None` when the payload is not a JSON object. Non-numeric
    /// fields are ignored.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let map = payload.as_object()?;
        let mut stats = NodeStats::default();

        for (key, value) in map {
            let Some(number) = value.as_f64() else {
                continue;
            };
            let counter = value
                .as_u64()
                .or_else(|| (number >= 0.0).then_some(number as u64));

            let slot = match snake_case(key).as_str() {
                "total_bytes" => &mut stats.total_bytes,
                "total_pages" => &mut stats.total_pages,
                "uptime" => &mut stats.uptime,
                "ram_used" => &mut stats.ram_used,
                "ram_total" => &mut stats.ram_total,
                "active_streams" => &mut stats.active_streams,
                "packets_sent" => &mut stats.packets_sent,
                "packets_received" => &mut stats.packets_received,
                "file_size" => &mut stats.file_size,
                "cpu_percent" => {
                    stats.cpu_percent = Some(number);
                    continue;
                }
                _ => {
                    stats.extra.insert(key.clone(), number);
                    continue;
                }
            };

            match counter {
                Some(c) => *slot = Some(c),
                None => {
                    stats.extra.insert(key.clone(), number);
                }
            }
        }

        Some(stats)
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '-' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    out
}

/// A discovery record with the node's stats merged in, if they were fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: NodeRecord,
    #[serde(flatten)]
    pub stats: Option<NodeStats>,
}

impl EnrichedRecord {
    pub fn unenriched(record: NodeRecord) -> Self {
        Self {
            record,
            stats: None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.stats.is_some()
    }
}
