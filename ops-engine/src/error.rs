//! Caller-facing errors for the engine.
//!
//! Only operation creation fails through a `Result`; everything after that
//! is reported through the published view's terminal [`Outcome`], so callers
//! observe exactly one terminal event per operation.
//!
//! [`Outcome`]: crate::operation::Outcome

use thiserror::Error;

use crate::transport::TransportError;

/// The creation call failed; no operation exists and no observer was
/// attached. Retrying `start` is the caller's decision.
#[derive(Debug, Clone, Error)]
pub enum StartError {
    /// The backend denied authorization; re-authenticate before retrying.
    #[error("authorization denied while starting operation: {0}")]
    Unauthorized(String),
    /// The creation call failed (network, validation, backend error).
    #[error("operation creation failed: {0}")]
    Creation(String),
}

impl From<TransportError> for StartError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized(detail) => StartError::Unauthorized(detail),
            TransportError::Retriable(detail) | TransportError::Fatal(detail) => {
                StartError::Creation(detail)
            }
        }
    }
}
