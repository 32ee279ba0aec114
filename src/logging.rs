use tracing_subscriber::EnvFilter;

use crate::error::{AqmError, Result};

/// Install a formatted tracing subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| AqmError::Config(format!("invalid log filter '{}': {}", default_filter, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| AqmError::Config(e.to_string()))
}
