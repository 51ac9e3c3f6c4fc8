//! Tracing subscriber setup

use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Parse a filter directive, falling back to `info` when it does not parse.
pub fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("ignoring log filter '{directive}': {e}");
        EnvFilter::new("info")
    })
}

/// Install the global subscriber: formatted output on stderr filtered by
/// `directive` (see [`crate::config::log_directive`]).
pub fn init(directive: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(env_filter(directive))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
