//! Configuration Module
//!
//! Holds the proxy configuration: the target bucket, the optional
//! response-header transform, and the enumerated backend-client options.
//! Client options are serde-deserializable so hosting processes can load
//! them from their own configuration files.

use crate::{ProxyError, Result};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pure function applied to upstream response headers before they are
/// written to a caller's sink.
pub type HeaderTransform = Arc<dyn Fn(HeaderMap) -> HeaderMap + Send + Sync>;

/// Custom deserializer for optional Duration from string format like "30s", "5m"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty duration string".to_string());
        }

        let mut num_end = 0;
        for (i, c) in s.chars().enumerate() {
            if c.is_ascii_digit() || c == '.' {
                num_end = i + 1;
            } else {
                break;
            }
        }

        if num_end == 0 {
            return Err(format!("No number found in duration string: {}", s));
        }

        let value: f64 = s[..num_end]
            .parse()
            .map_err(|e| format!("Failed to parse number '{}': {}", &s[..num_end], e))?;

        match s[num_end..].trim() {
            "ms" => Ok(Duration::from_secs_f64(value / 1000.0)),
            "" | "s" | "sec" | "secs" => Ok(Duration::from_secs_f64(value)),
            "m" | "min" | "mins" => Ok(Duration::from_secs_f64(value * 60.0)),
            "h" | "hr" | "hrs" => Ok(Duration::from_secs_f64(value * 3600.0)),
            unit => Err(format!("Unknown duration unit: {}", unit)),
        }
    }
}

/// Backend-client configuration.
///
/// Every field the proxy forwards to the remote store client is enumerated
/// here; a misspelled option is a compile error instead of a silently
/// ignored key. `extra` is the escape hatch for custom [`RemoteStore`]
/// implementations that understand additional keys; the AWS-backed store
/// logs and otherwise ignores it.
///
/// [`RemoteStore`]: crate::store::RemoteStore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// AWS region, e.g. "us-east-1". Falls back to the environment.
    pub region: Option<String>,
    /// Custom endpoint URL, for S3-compatible stores and local stacks.
    pub endpoint_url: Option<String>,
    /// Named credentials profile to load.
    pub profile: Option<String>,
    /// Use path-style bucket addressing instead of virtual-hosted style.
    pub force_path_style: bool,
    /// Per-operation timeout, enforced by the client transport. Timeouts
    /// surface as stream or callback errors like any other remote failure.
    #[serde(deserialize_with = "duration_serde::deserialize_opt")]
    pub request_timeout: Option<Duration>,
    /// Free-form options for custom store implementations.
    pub extra: HashMap<String, String>,
}

impl ClientOptions {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err("region must not be empty when set".to_string());
            }
        }

        if let Some(endpoint) = &self.endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!(
                    "endpoint_url must be an http(s) URL, got '{}'",
                    endpoint
                ));
            }
        }

        if let Some(profile) = &self.profile {
            if profile.trim().is_empty() {
                return Err("profile must not be empty when set".to_string());
            }
        }

        if let Some(timeout) = self.request_timeout {
            if timeout.is_zero() {
                return Err("request_timeout must be greater than zero".to_string());
            }
        }

        Ok(())
    }
}

/// Proxy configuration, fixed at construction.
#[derive(Clone, Default)]
pub struct ProxyConfig {
    /// Bucket the proxy reads from. Required and non-empty.
    pub bucket: String,
    /// Optional transform applied to upstream headers before they reach a
    /// registered response sink.
    pub response_headers: Option<HeaderTransform>,
    /// Backend-client options.
    pub client: ClientOptions,
}

impl ProxyConfig {
    /// Create a configuration for the given bucket with default client options.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Set the response-header transform.
    pub fn with_response_headers<F>(mut self, transform: F) -> Self
    where
        F: Fn(HeaderMap) -> HeaderMap + Send + Sync + 'static,
    {
        self.response_headers = Some(Arc::new(transform));
        self
    }

    /// Set the backend-client options.
    pub fn with_client_options(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    /// Construction-time validation. Runs before any network activity.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(ProxyError::InvalidParameterList(
                "bucket parameter is required".to_string(),
            ));
        }
        self.client
            .validate()
            .map_err(ProxyError::InvalidParameterList)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("bucket", &self.bucket)
            .field(
                "response_headers",
                &self.response_headers.as_ref().map(|_| "<transform>"),
            )
            .field("client", &self.client)
            .finish()
    }
}
