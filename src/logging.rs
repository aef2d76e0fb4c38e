//! Tracing subscriber setup for the collector daemon.
//!
//! The collector's own events and dependency events get separate levels:
//! at `debug` the collector logs every failed RPC attempt, and the HTTP
//! client stack would bury those under connection-pool chatter.

use chrono::Utc;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Target prefix shared by the library and the daemon binary
const CRATE_TARGET: &str = "pnode_collector";

/// Filter directive built from config; `verbose` forces the collector's
/// own events to `trace` without touching dependency levels.
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose { "trace" } else { config.level.as_str() };
    format!("{},{}={}", config.dependency_level, CRATE_TARGET, level)
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// levels when set.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)));

    if config.format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(false)
            .init();
        return;
    }

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    // journald stamps time and host itself
    if running_under_systemd() {
        builder.without_time().init();
    } else {
        let hostname = config.show_hostname.then(short_hostname);
        builder.with_timer(CollectorTimer { hostname }).init();
    }
}

fn running_under_systemd() -> bool {
    std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok()
}

fn short_hostname() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    hostname.split('.').next().unwrap_or(&hostname).to_string()
}

/// UTC millisecond timestamp, optionally followed by `[hostname]`
struct CollectorTimer {
    hostname: Option<String>,
}

impl FormatTime for CollectorTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Utc::now();
        write!(
            w,
            "{}.{:03}",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis()
        )?;
        match &self.hostname {
            Some(hostname) => write!(w, " [{}]", hostname),
            None => Ok(()),
        }
    }
}
