//! File logging. The terminal belongs to the UI, so events go to
//! `<cache_dir>/cwicr.log`.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cache::{CacheManager, LOG_FILE};

/// Overrides the configured level, e.g. `CWICR_LOG=cwicr=trace`.
pub const LOG_ENV: &str = "CWICR_LOG";

/// Filter directive: `CWICR_LOG` if set, else `debug` in debug mode, else `level`.
pub fn filter_directive(env: Option<String>, debug: bool, level: &str) -> String {
    match env {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug => "debug".to_string(),
        _ => level.to_string(),
    }
}

/// Installs the global subscriber. Returns the log file path.
pub fn init_logging(cache: &CacheManager, debug: bool, level: &str) -> Result<PathBuf> {
    cache.ensure_cache_dir()?;
    let path = cache.cache_file(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let directive = filter_directive(std::env::var(LOG_ENV).ok(), debug, level);
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| eyre!("Failed to set global tracing subscriber: {}", e))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "START");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_precedence() {
        assert_eq!(filter_directive(None, false, "warn"), "warn");
        assert_eq!(filter_directive(None, true, "warn"), "debug");
        assert_eq!(
            filter_directive(Some("cwicr=trace".into()), true, "warn"),
            "cwicr=trace"
        );
        assert_eq!(filter_directive(Some("  ".into()), false, "info"), "info");
    }
}
