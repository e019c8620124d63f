//! Subscriber initialization.

use crate::types::{InsightError, Result};
use std::env;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Read `INSIGHT_LOG_FORMAT` (`json` or anything else).
    pub fn from_env() -> Self {
        match env::var("INSIGHT_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns `InsightError::ConfigError` if a global subscriber is already set
pub fn init_tracing(service_name: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| InsightError::ConfigError(format!("tracing init failed: {}", e)))?;

    tracing::info!(service = service_name, format = ?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        // whichever call wins, the other must report rather than panic
        let first = init_tracing("test", LogFormat::Pretty);
        let second = init_tracing("test", LogFormat::Pretty);
        assert!(first.is_err() || second.is_err());
    }
}
