//! Runtime configuration for the backend client, loaded from environment
//! variables.
//!
//! The poll interval is a tuning parameter for the tracking engine, not a
//! correctness property; it only controls how often polled operations are
//! refreshed.

use std::time::Duration;

use crate::error_handler::{Result, env_opt_u64, must_env, validate_http_endpoint};

/// Default interval between status fetches for polled operations.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;

/// Default HTTP timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for one backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://127.0.0.1:8077`.
    pub base_url: String,
    /// Optional bearer token sent on every request.
    pub api_key: Option<String>,
    /// Per-request timeout; falls back to [`DEFAULT_TIMEOUT_SECS`].
    pub timeout_secs: Option<u64>,
    /// Interval between status fetches for polled operations.
    pub poll_interval_ms: u64,
}

impl BackendConfig {
    /// Creates a config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Builds the config from environment variables.
    ///
    /// Reads `BACKEND_URL` (required), `BACKEND_API_KEY`,
    /// `BACKEND_TIMEOUT_SECS` and `OPS_POLL_INTERVAL_MS`.
    ///
    /// # Errors
    /// Returns a config error when `BACKEND_URL` is missing or malformed, or
    /// when a numeric variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let base_url = must_env("BACKEND_URL")?;
        validate_http_endpoint("BACKEND_URL", &base_url)?;

        let api_key = std::env::var("BACKEND_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            base_url,
            api_key,
            timeout_secs: env_opt_u64("BACKEND_TIMEOUT_SECS")?,
            poll_interval_ms: env_opt_u64("OPS_POLL_INTERVAL_MS")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        })
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Effective request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cfg = BackendConfig::new("http://localhost:8077");
        assert_eq!(cfg.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1_500));
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn from_env_requires_base_url() {
        unsafe { std::env::remove_var("BACKEND_URL") };
        assert!(BackendConfig::from_env().is_err());
    }
}
