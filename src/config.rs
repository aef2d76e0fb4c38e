//! Configuration management for the pNode collector.
//!
//! A single TOML file with one section per component. Every field has a
//! default, so a partial file (or none at all) is valid; `load_or_create`
//! writes the defaults out on first run so operators have something to edit.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub rpc: RpcConfig,
    pub cache: CacheConfig,
    pub enrichment: EnrichmentConfig,
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Seed hosts, `host` or `host:port`
    pub seeds: Vec<String>,
    /// Port used for seeds listed without one
    pub seed_port: u16,
    pub method: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            seed_port: constants::rpc::DEFAULT_RPC_PORT,
            method: constants::rpc::METHOD_GET_PODS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Fallback RPC port tried after gossip+1
    pub default_port: u16,
    /// Hard bound on one RPC attempt
    pub timeout_ms: u64,
    pub stats_method: String,
    pub version_method: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_port: constants::rpc::DEFAULT_RPC_PORT,
            timeout_ms: constants::rpc::CALL_TIMEOUT_MS,
            stats_method: constants::rpc::METHOD_GET_STATS.to_string(),
            version_method: constants::rpc::METHOD_GET_VERSION.to_string(),
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file; empty means `<temp dir>/pnode-collector/rpc-cache.json`
    pub path: String,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub flush_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            ttl_secs: constants::cache::STATS_TTL_SECS,
            max_entries: constants::cache::MAX_ENTRIES,
            flush_interval_ms: constants::cache::FLUSH_INTERVAL_MS,
        }
    }
}

impl CacheConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.trim().is_empty() {
            default_cache_path()
        } else {
            PathBuf::from(&self.path)
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Process-local temp location of the persisted cache
pub fn default_cache_path() -> PathBuf {
    std::env::temp_dir()
        .join(constants::cache::CACHE_DIR_NAME)
        .join(constants::cache::CACHE_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// How many discovered nodes get stats per pass
    pub limit: usize,
    /// Ask nodes with an empty version for it
    pub fill_missing_versions: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            limit: constants::collector::ENRICH_LIMIT,
            fill_missing_versions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub refresh_interval_secs: u64,
    /// Where the latest snapshot is written as JSON; empty disables it
    pub output_path: String,
    /// How long running tasks get to finish after ctrl-c
    pub shutdown_grace_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: constants::collector::REFRESH_INTERVAL_SECS,
            output_path: String::new(),
            shutdown_grace_secs: constants::collector::SHUTDOWN_GRACE_SECS,
        }
    }
}

impl CollectorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        let path = self.output_path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the collector's own events
    pub level: String,
    /// Level for everything else (HTTP client internals are chatty)
    pub dependency_level: String,
    /// `compact` or `json`
    pub format: String,
    /// Prefix compact lines with the short hostname
    pub show_hostname: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dependency_level: "warn".to_string(),
            format: "compact".to_string(),
            show_hostname: true,
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    ///
    /// The flag is `true` when the defaults were written.
    pub fn load_or_create(path: impl AsRef<Path>) -> AppResult<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            return Ok((Self::load_from_file(path)?, false));
        }

        let config = Config::default();
        config.save_to_file(path)?;
        Ok((config, true))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.rpc.timeout_ms == 0 {
            return Err(AppError::Config("rpc.timeout_ms must be positive".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(AppError::Config("cache.ttl_secs must be positive".into()));
        }
        if self.discovery.method.trim().is_empty() || self.rpc.stats_method.trim().is_empty() {
            return Err(AppError::Config("RPC method names must not be empty".into()));
        }
        if !matches!(self.logging.format.as_str(), "compact" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"compact\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        Ok(())
    }
}
