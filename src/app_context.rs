use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::collector::Collector;
use crate::config::Config;
use crate::discovery::NodeDiscovery;
use crate::enrichment::StatsEnricher;
use crate::rpc::{HttpTransport, PortResolver, RpcTransport};

/// Shared application context containing all major components
pub struct AppContext {
    pub config: Config,
    pub transport: Arc<dyn RpcTransport>,
    pub cache: Arc<ResponseCache>,
    pub resolver: Arc<PortResolver>,
    pub collector: Arc<Collector>,
}

impl AppContext {
    /// Wire the components from configuration using the HTTP transport
    pub fn from_config(config: Config) -> Self {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new(config.rpc.timeout()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: Arc<dyn RpcTransport>) -> Self {
        let cache = Arc::new(ResponseCache::load(
            config.cache.resolved_path(),
            config.cache.ttl(),
            config.cache.max_entries,
        ));

        let resolver = Arc::new(PortResolver::new(
            Arc::clone(&transport),
            Arc::clone(&cache),
            config.rpc.default_port,
        ));

        let discovery = NodeDiscovery::new(
            Arc::clone(&transport),
            &config.discovery.seeds,
            config.discovery.seed_port,
            config.discovery.method.clone(),
        );

        let mut enricher = StatsEnricher::new(
            Arc::clone(&resolver),
            config.rpc.stats_method.clone(),
            config.rpc.timeout(),
        );
        if config.enrichment.fill_missing_versions {
            enricher = enricher.with_version_fill(config.rpc.version_method.clone());
        }

        let collector = Arc::new(
            Collector::new(discovery, enricher, config.enrichment.limit)
                .with_output(config.collector.output_path()),
        );

        Self {
            config,
            transport,
            cache,
            resolver,
            collector,
        }
    }
}
