//! Unified error handling for `backend-client`.
//!
//! One top-level [`BackendError`] for the whole crate, with configuration
//! problems grouped in [`ConfigError`]. Authorization denials get their own
//! variant because the tracking engine must treat them as a session-level
//! condition, not as a failure of the operation being watched.
//!
//! Small helpers for reading/validating environment variables return the
//! unified [`Result<T>`] alias.

use reqwest::StatusCode;
use thiserror::Error;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Maximum number of characters kept from a response body in error messages.
const SNIPPET_MAX_CHARS: usize = 240;

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `backend-client` crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Configuration/validation errors (startup/readiness).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Underlying HTTP transport error (e.g., `reqwest::Error`).
    #[error("[Backend Client] transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend denied authorization (HTTP 401/403). The caller's session
    /// is invalid; the targeted operation may still be running server-side.
    #[error("[Backend Client] authorization denied by {url}")]
    Unauthorized {
        /// Request URL.
        url: String,
    },

    /// Non-successful HTTP status other than an authorization denial.
    #[error("[Backend Client] unexpected HTTP status {status} from {url}: {snippet}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: StatusCode,
        /// Request URL.
        url: String,
        /// Short snippet of the response body.
        snippet: String,
    },

    /// The response envelope carried `success = false`.
    #[error("[Backend Client] backend error {code}: {message}")]
    Api {
        /// Stable machine-readable error code from the envelope.
        code: String,
        /// Human-friendly error message from the envelope.
        message: String,
    },

    /// Unexpected/invalid JSON response.
    #[error("[Backend Client] failed to decode response: {0}")]
    Decode(String),
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[Backend Client] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (ports, limits, timeouts).
    #[error("[Backend Client] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g., `BACKEND_TIMEOUT_SECS`).
        var: &'static str,
        /// Human-readable reason (e.g., `expected u64`).
        reason: &'static str,
    },

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[Backend Client] invalid format in {var}: {reason}")]
    InvalidFormat {
        /// Variable name (e.g., `BACKEND_URL`).
        var: &'static str,
        /// Explanation (e.g., `must start with http:// or https://`).
        reason: &'static str,
    },
}

/* ------------------------------------------------------------------------- */
/* Env helpers (return unified `Result<T>`)                                  */
/* ------------------------------------------------------------------------- */

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// Returns [`BackendError::Config`] with [`ConfigError::MissingVar`] if the
/// variable is absent or empty.
pub fn must_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Parses an optional `u64` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`BackendError::Config`] with [`ConfigError::InvalidNumber`] if the
/// variable is set but not a valid `u64`.
pub fn env_opt_u64(name: &'static str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.parse::<u64>().map(Some).map_err(|_| {
            BackendError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u64",
            })
        }),
        _ => Ok(None),
    }
}

/* ------------------------------------------------------------------------- */
/* Validation helpers                                                        */
/* ------------------------------------------------------------------------- */

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`BackendError::Config`] with [`ConfigError::InvalidFormat`] when
/// the string does not start with a valid HTTP scheme.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

/// Clamps a response body to a short, log-friendly snippet.
pub fn make_snippet(body: &str) -> String {
    body.chars().take(SNIPPET_MAX_CHARS).collect()
}
