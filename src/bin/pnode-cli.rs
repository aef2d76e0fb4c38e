use clap::{Parser, Subcommand};
use pnode_collector::app_context::AppContext;
use pnode_collector::config::Config;
use pnode_collector::rpc::resolver::split_address;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "pnode-cli")]
#[command(about = "pNode network CLI - one-shot discovery and RPC queries", long_about = None)]
struct Args {
    /// Collector config file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "collector.toml")]
    config: String,

    /// Output compact JSON (single line)
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "lowercase")]
enum Commands {
    /// Discover nodes through the configured seeds
    Discover,

    /// Discover nodes and fetch stats for the freshest ones
    Enrich {
        /// Number of nodes to enrich (defaults to the configured limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch stats for one node (port fallback + cache)
    Stats {
        /// Node gossip address, host:port
        address: String,
    },

    /// Fetch the software version of one node (port fallback + cache)
    Version {
        /// Node gossip address, host:port
        address: String,
    },

    /// Raw RPC call to an exact host and port (no fallback, no cache)
    Call {
        host: String,
        port: u16,
        method: String,
    },

    /// Show the RPC ports that would be tried for an address
    Ports {
        /// Node gossip address, host:port
        address: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run_command(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = if Path::new(&args.config).exists() {
        Config::load_from_file(&args.config)?
    } else {
        Config::default()
    };

    let ctx = AppContext::from_config(config);

    let output: Value = match &args.command {
        Commands::Discover => {
            let nodes = ctx.collector.discovery().discover_all().await;
            to_json(&nodes)?
        }
        Commands::Enrich { limit } => {
            let limit = limit.unwrap_or(ctx.config.enrichment.limit);
            let snapshot = ctx.collector.refresh_with_limit(limit).await;
            to_json(&snapshot)?
        }
        Commands::Stats { address } => {
            let method = &ctx.config.rpc.stats_method;
            ctx.resolver
                .resolve(address, method)
                .await
                .ok_or_else(|| format!("No RPC port of {} answered {}", address, method))?
        }
        Commands::Version { address } => {
            let method = &ctx.config.rpc.version_method;
            ctx.resolver
                .resolve(address, method)
                .await
                .ok_or_else(|| format!("No RPC port of {} answered {}", address, method))?
        }
        Commands::Call { host, port, method } => ctx
            .transport
            .call(host, *port, method)
            .await
            .ok_or_else(|| format!("{}:{} returned no result for {}", host, port, method))?,
        Commands::Ports { address } => {
            let (host, gossip_port) = split_address(address);
            json!({
                "host": host,
                "gossipPort": gossip_port,
                "candidates": ctx.resolver.candidates_for(address),
            })
        }
    };

    // Persist whatever the resolver cached before exiting
    ctx.cache.flush_if_dirty()?;

    if args.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}
