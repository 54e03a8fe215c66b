// src/logging.rs

//! Logging setup for `treewatch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TREEWATCH_LOG` environment variable, either a bare level ("debug")
//!    or a full filter directive ("treewatch::engine=trace,info")
//! 3. default to `info`
//!
//! Logs go to STDERR; stdout carries the event stream.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "TREEWATCH_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_from_log_level(level).as_str());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_environment() {
        let filter = build_filter(Some(LogLevel::Warn), Some("trace"));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn environment_accepts_directives_and_falls_back() {
        assert_eq!(
            build_filter(None, Some("treewatch::engine=trace")).to_string(),
            "treewatch::engine=trace"
        );
        assert_eq!(build_filter(None, Some("  ")).to_string(), "info");
        assert_eq!(build_filter(None, None).to_string(), "info");
    }
}
