use clap::Parser;
use pnode_collector::app_context::AppContext;
use pnode_collector::config::Config;
use pnode_collector::logging;
use pnode_collector::shutdown::ShutdownManager;

#[derive(Parser, Debug)]
#[command(name = "pnode-collector")]
#[command(about = "pNode discovery and stats collector", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "collector.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    /// Run a single refresh pass, print the snapshot and exit
    #[arg(long)]
    once: bool,

    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        match Config::default().save_to_file(&args.config) {
            Ok(_) => {
                println!("✅ Generated default config at: {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("❌ Failed to generate config: {}", e);
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_or_create(&args.config) {
        Ok((cfg, true)) => {
            println!("📝 Wrote default configuration to {}", args.config);
            cfg
        }
        Ok((cfg, false)) => {
            println!("✓ Loaded configuration from {}", args.config);
            cfg
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.logging, args.verbose);

    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("BUILD_DATE").unwrap_or("unknown");

    println!("\n🚀 pNode Collector v{} ({})", version, git_hash);
    println!("  └─ Build: {}", build_date);
    println!("═══════════════════════════════════════════════════════");
    println!("🌱 Seeds: {}", config.discovery.seeds.len());
    println!("📡 Default RPC port: {}", config.rpc.default_port);
    println!("📊 Enrichment limit: {}", config.enrichment.limit);
    println!("💾 Cache: {}", config.cache.resolved_path().display());
    println!();

    let ctx = AppContext::from_config(config);

    if ctx.collector.discovery().seeds().is_empty() {
        tracing::warn!("⚠️ No usable seeds in {}; add [discovery] seeds", args.config);
    }

    if args.once {
        let snapshot = ctx.collector.refresh().await;
        if let Err(e) = ctx.cache.flush_if_dirty() {
            tracing::warn!("Failed to persist RPC cache: {}", e);
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("❌ Failed to encode snapshot: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut shutdown_manager =
        ShutdownManager::new().with_grace_period(ctx.config.collector.shutdown_grace());
    let shutdown_token = shutdown_manager.token();

    shutdown_manager.register_task(
        ctx.cache
            .spawn_flusher(ctx.config.cache.flush_interval(), shutdown_token.clone()),
    );

    let collector = ctx.collector.clone();
    let cache = ctx.cache.clone();
    let interval = ctx.config.collector.refresh_interval();
    let token = shutdown_token.clone();
    shutdown_manager.register_task(tokio::spawn(async move {
        tracing::info!("🔄 Refreshing every {:?}", interval);
        tokio::select! {
            _ = collector.run(interval, token.clone()) => {}
            _ = log_cache_stats(cache, interval, token) => {}
        }
    }));

    shutdown_manager.wait_for_shutdown().await;
}

async fn log_cache_stats(
    cache: std::sync::Arc<pnode_collector::ResponseCache>,
    interval: std::time::Duration,
    token: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                tracing::info!("💾 RPC cache: {}", cache.stats());
            }
        }
    }
}
