//! Telemetry initialisation for gateway embedders.
//!
//! Lightweight setup: structured JSON logs to stdout. The gateway has no
//! collector of its own, so there is no exporter pipeline here; embedders
//! that ship spans elsewhere can install their own subscriber instead.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber for a gateway process.
///
/// Outputs structured JSON logs at the configured level; `RUST_LOG`
/// overrides it when set.
///
/// # Errors
///
/// Returns an error if a subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise gateway tracing subscriber: {e}"))
}
