// src/logging.rs

//! Logging setup for `assetpipe` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `ASSETPIPE_LOG` environment variable, either a level ("debug") or a
//!    full filter directive ("assetpipe=debug,tower_http=info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that command stdout stays clean for
//! `assetpipe tasks`.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "ASSETPIPE_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

/// Filter for the given CLI level and environment value.
pub fn resolve_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(level_str(lvl));
    }
    env.and_then(|s| EnvFilter::try_new(s.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_str(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
