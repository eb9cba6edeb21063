//! Shared helpers for the command-line tools

use crate::config::{load_config, Config};
use crate::error::{ChainError, Result};
use crate::node::LedgerNode;
use crate::payload::Payload;
use std::path::Path;

/// Installs the global fmt subscriber, writing to stderr at `level`.
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_tracing(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| ChainError::ConfigError(format!("Unknown log level {:?}", level)))?;
    if let Err(e) = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        tracing::debug!("Keeping the installed subscriber: {}", e);
    }
    Ok(())
}

/// Loads the config at `path`, installs logging and opens the ledger it names.
pub fn load_node_from_config<P: Payload>(path: impl AsRef<Path>) -> Result<(Config, LedgerNode<P>)> {
    let config = load_config(path)?;
    init_tracing(&config.logging.level)?;
    let node = LedgerNode::init(config.clone())?;
    Ok((config, node))
}

/// Shortens a fingerprint for table display: first and last `keep` characters.
pub fn short_fingerprint(fingerprint: &str, keep: usize) -> String {
    if fingerprint.len() > keep * 2 + 3 {
        format!(
            "{}...{}",
            &fingerprint[..keep],
            &fingerprint[fingerprint.len() - keep..]
        )
    } else {
        fingerprint.to_string()
    }
}

/// Renders a millisecond timestamp as RFC 3339 (UTC).
pub fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}
