//! Global constants for the pNode collector
//!
//! Centralizes the protocol defaults (ports, method names, timeouts) so the
//! config defaults, the binaries and the tests agree on one set of values.

/// pNode JSON-RPC protocol constants
pub mod rpc {
    /// Port the pNode RPC service listens on when nothing else is known
    pub const DEFAULT_RPC_PORT: u16 = 6000;

    /// HTTP path every RPC request is posted to
    pub const RPC_PATH: &str = "/rpc";

    /// JSON-RPC protocol version sent in every envelope
    pub const JSONRPC_VERSION: &str = "2.0";

    /// Fixed request id (one request per connection, no correlation needed)
    pub const REQUEST_ID: u64 = 1;

    /// Hard bound on a single RPC attempt (connect + request + body)
    pub const CALL_TIMEOUT_MS: u64 = 1_000;

    /// Method that lists the node population as seen by a seed
    pub const METHOD_GET_PODS: &str = "get-pods";

    /// Method that returns per-node operational statistics
    pub const METHOD_GET_STATS: &str = "get-stats";

    /// Method that returns a node's software version
    pub const METHOD_GET_VERSION: &str = "get-version";
}

/// Response cache constants
pub mod cache {
    /// Time-to-live for cached stats results (60 seconds)
    pub const STATS_TTL_SECS: u64 = 60;

    /// Upper bound on cached entries before the oldest one is evicted
    pub const MAX_ENTRIES: usize = 4_096;

    /// How often the background flusher rewrites a dirty cache file
    pub const FLUSH_INTERVAL_MS: u64 = 2_000;

    /// Directory under the system temp dir that holds the cache file
    pub const CACHE_DIR_NAME: &str = "pnode-collector";

    /// File name of the persisted cache
    pub const CACHE_FILE_NAME: &str = "rpc-cache.json";
}

/// Enrichment and refresh constants
pub mod collector {
    /// Number of discovered nodes enriched with stats per pass
    pub const ENRICH_LIMIT: usize = 20;

    /// Interval between scheduled refresh passes (30 seconds)
    pub const REFRESH_INTERVAL_SECS: u64 = 30;

    /// Time tasks get to wind down after a shutdown signal
    pub const SHUTDOWN_GRACE_SECS: u64 = 10;
}
