//! Logging Module
//!
//! Tracing subscriber bootstrap for hosting processes. The proxy itself
//! only emits `tracing` events; installing a subscriber is the host's
//! choice, and these helpers cover the common case.

use crate::{ProxyError, Result};
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber with the given filter directive,
/// e.g. `"info"` or `"s3proxy=debug,info"`.
pub fn init(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter)
        .map_err(|e| ProxyError::ConfigError(format!("invalid log filter '{}': {}", filter, e)))?;
    install(env_filter)
}

/// Install a formatting subscriber filtered by `RUST_LOG`, defaulting to
/// `info` when the variable is unset or unparseable.
pub fn init_from_env() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(env_filter)
}

fn install(env_filter: EnvFilter) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| ProxyError::ConfigError(format!("failed to install log subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_config_error() {
        let err = init("not==a==filter").unwrap_err();
        assert!(matches!(err, ProxyError::ConfigError(_)));
    }
}
