//! Client-side tracking for long-running backend operations.
//!
//! The engine starts a server-side job (repository indexing, source
//! discovery, or a streaming chat completion), observes it through either a
//! poll loop or a framed delta stream, reconciles snapshots and deltas into
//! one coherent view under a single-writer discipline, and publishes exactly
//! one terminal [`Outcome`] per operation.
//!
//! Entry point: build an [`Orchestrator`] over an [`OperationTransport`]
//! (use [`HttpTransport`] for a real backend), call
//! [`Orchestrator::start`], and watch the published [`OperationView`]s.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use backend_client::{BackendClient, BackendConfig};
//! use ops_engine::{HttpTransport, IndexRequest, OperationRequest, Orchestrator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BackendClient::new(&BackendConfig::new("http://127.0.0.1:8077"))?;
//! let orchestrator = Orchestrator::new(Arc::new(HttpTransport::new(client)));
//!
//! let handle = orchestrator
//!     .start(OperationRequest::Index(IndexRequest::new("my-project")))
//!     .await?;
//! let outcome = orchestrator.wait(&handle).await;
//! println!("index finished: {outcome:?}");
//! # Ok(()) }
//! ```

mod error;
mod frames;
mod operation;
mod orchestrator;
mod poll;
mod reconcile;
mod select;
mod stream;
mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::StartError;
pub use frames::{DeltaEvent, END_SENTINEL, EVENT_PREFIX, Frame, FrameDecoder, SourceRef};
pub use operation::{
    AccumulatedMessage, OperationHandle, OperationKind, OperationStatus, OperationView, Outcome,
    ResultItem, Snapshot,
};
pub use orchestrator::{DEFAULT_POLL_INTERVAL, Orchestrator};
pub use select::SelectionSet;
pub use transport::{
    DeltaByteStream, HttpTransport, OperationRequest, OperationTransport, StartedOperation,
    TransportError,
};

// Request payloads come from the wire crate; re-exported so most callers
// only import from here.
pub use backend_client::{ChatMessage, CompletionRequest, DiscoveryRequest, IndexRequest};
