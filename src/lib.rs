//! Discovery and stats collection for pNode storage-provider networks.
//!
//! Seeds are asked for the node population ([`discovery`]), duplicate
//! sightings are merged, and per-node stats are fetched through a
//! port-fallback resolver ([`rpc`]) backed by a persisted response cache
//! ([`cache`]). [`collector`] runs that pipeline on a schedule.

pub mod app_context;
pub mod cache;
pub mod collector;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod shutdown;
pub mod types;

pub use cache::ResponseCache;
pub use collector::{Collector, DiscoveryStatus, Snapshot};
pub use discovery::NodeDiscovery;
pub use enrichment::StatsEnricher;
pub use error::{AppError, AppResult};
pub use rpc::{HttpTransport, PortResolver, RpcTransport};
pub use types::{EnrichedRecord, NodeRecord, NodeStats};
