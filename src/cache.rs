//! Persisted RPC response cache
//!
//! Keeps the last successful result per `"<method>:<host>"` key together
//! with its fetch time. Entries are never swept: staleness is judged when
//! an entry is read, against a fixed TTL. The in-memory map is rewritten to
//! a JSON file by a background flusher whenever it has changed, so a
//! restarted collector starts warm instead of re-polling every node.
//!
//! File format: `{ "<method>:<host>": { "data": <json>, "timestamp": <ms> } }`

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;

/// One cached RPC result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    /// Fetch time, milliseconds since epoch
    pub timestamp: i64,
}

pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    path: Option<PathBuf>,
    /// Set on every write, cleared by a successful flush
    dirty: AtomicBool,
    /// Serializes file rewrites
    write_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ResponseCache {
    /// Cache that lives only in memory (nothing is persisted)
    pub fn in_memory(ttl: Duration, max_entries: usize) -> Self {
        Self::with_entries(HashMap::new(), ttl, max_entries, None)
    }

    /// Load the cache from `path`.
    ///
    /// A missing or unreadable file is a cold start, never an error.
    pub fn load(path: impl Into<PathBuf>, ttl: Duration, max_entries: usize) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => {
                tracing::info!(
                    "📦 Loaded {} cached RPC results from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Ok(None) => {
                tracing::debug!("No RPC cache at {}, starting cold", path.display());
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Ignoring unreadable RPC cache {}: {}",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };

        Self::with_entries(entries, ttl, max_entries, Some(path))
    }

    fn with_entries(
        entries: HashMap<String, CacheEntry>,
        ttl: Duration,
        max_entries: usize,
        path: Option<PathBuf>,
    ) -> Self {
        let cache = Self {
            entries: RwLock::new(entries),
            ttl,
            max_entries: max_entries.max(1),
            path,
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        };

        {
            let mut entries = cache.entries.write();
            while entries.len() > cache.max_entries {
                if !cache.evict_oldest(&mut entries) {
                    break;
                }
            }
        }

        cache
    }

    /// Cache key for a method against a host (port deliberately excluded).
    pub fn key(method: &str, host: &str) -> String {
        format!("{}:{}", method, host)
    }

    /// Get a cached value if present and younger than the TTL
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if self.is_fresh(entry, now_ms()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value stamped with the current time
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.insert_at(key.into(), value, now_ms());
    }

    /// Raw entry regardless of age
    #[cfg(test)]
    pub(crate) fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn insert_at(&self, key: String, data: Value, timestamp: i64) {
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            self.evict_oldest(&mut entries);
        }
        entries.insert(key, CacheEntry { data, timestamp });
        self.dirty.store(true, Ordering::Release);
    }

    fn is_fresh(&self, entry: &CacheEntry, now: i64) -> bool {
        // A timestamp from the future (skewed clock, edited file) is stale
        if entry.timestamp > now {
            return false;
        }
        now - entry.timestamp < self.ttl.as_millis() as i64
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry>) -> bool {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.timestamp)
            .map(|(key, _)| key.clone());

        match oldest {
            Some(key) => {
                entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Evicted cached RPC result {}", key);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Rewrite the whole cache file (temp file + rename).
    pub fn flush(&self) -> AppResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock();
        self.dirty.store(false, Ordering::Release);

        let contents = {
            let entries = self.entries.read();
            serde_json::to_vec(&*entries)
        };
        let contents = match contents {
            Ok(c) => c,
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                return Err(e.into());
            }
        };

        if let Err(e) = write_atomically(path, &contents) {
            self.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }

        tracing::trace!("Flushed RPC cache to {}", path.display());
        Ok(())
    }

    /// Flush only if something changed since the last flush.
    pub fn flush_if_dirty(&self) -> AppResult<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Spawn the background flusher.
    ///
    /// Rewrites the file every `interval` when dirty and once more when
    /// `token` is cancelled.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let cache = Arc::clone(&cache);
                        match tokio::task::spawn_blocking(move || cache.flush_if_dirty()).await {
                            Ok(Err(e)) => tracing::warn!("Final RPC cache flush failed: {}", e),
                            Err(e) => tracing::warn!("Final RPC cache flush task failed: {}", e),
                            Ok(Ok(_)) => {}
                        }
                        tracing::debug!("RPC cache flusher stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let cache = Arc::clone(&cache);
                        match tokio::task::spawn_blocking(move || cache.flush_if_dirty()).await {
                            Ok(Err(e)) => tracing::warn!("RPC cache flush failed: {}", e),
                            Err(e) => tracing::warn!("RPC cache flush task failed: {}", e),
                            Ok(Ok(_)) => {}
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            (hits as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            total_requests,
            hit_rate,
        }
    }
}

fn read_entries(path: &Path) -> AppResult<Option<HashMap<String, CacheEntry>>> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&contents)?))
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entries: {}, Hits: {}, Misses: {}, Evictions: {}, Hit rate: {:.1}%",
            self.entries, self.hits, self.misses, self.evictions, self.hit_rate
        )
    }
}
