//! Error Module
//!
//! Defines error types and result types used throughout the proxy.

use thiserror::Error;

/// Main error type for the bucket proxy.
///
/// Cloneable so errors can travel through the lifecycle event channel as
/// well as through `Result` returns and stream items.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("Invalid parameter list: {0}")]
    InvalidParameterList(String),

    #[error("Proxy is uninitialized (call init first)")]
    Uninitialized,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Remote store error: {0}")]
    RemoteError(String),
}

/// Result type alias for the bucket proxy.
pub type Result<T> = std::result::Result<T, ProxyError>;
