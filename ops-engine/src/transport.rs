//! The boundary between the engine and the wire.
//!
//! [`OperationTransport`] is the seam the poll loop and stream reader work
//! against; [`HttpTransport`] adapts the real [`BackendClient`], normalizing
//! wire payloads into the engine's kind-agnostic shapes. Tests drive the
//! engine through in-memory implementations of the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::warn;

use backend_client::{
    BackendClient, BackendError, CompletionRequest, DiscoveryRequest, IndexRequest, StatusSnapshot,
    WireItem, WireStatus,
};

use crate::operation::{OperationKind, OperationStatus, ResultItem, Snapshot};

/// Byte stream of a completion response, as seen by the stream reader.
pub type DeltaByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Engine-facing classification of wire failures.
///
/// The poll loop absorbs everything retriable; only authorization denials
/// stop an observer, because they condemn the caller's session rather than
/// one request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// HTTP 401/403; the session is invalid.
    #[error("authorization denied: {0}")]
    Unauthorized(String),
    /// A failure the next attempt may not repeat (network, 5xx, bad JSON).
    #[error("transient backend failure: {0}")]
    Retriable(String),
    /// A failure retrying cannot fix (misuse, configuration).
    #[error("backend failure: {0}")]
    Fatal(String),
}

impl From<BackendError> for TransportError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized { url } => TransportError::Unauthorized(url),
            BackendError::Config(_) => TransportError::Fatal(err.to_string()),
            _ => TransportError::Retriable(err.to_string()),
        }
    }
}

/// A creation request, one variant per operation kind.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Index(IndexRequest),
    Discovery(DiscoveryRequest),
    Completion(CompletionRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Index(_) => OperationKind::Index,
            OperationRequest::Discovery(_) => OperationKind::Discovery,
            OperationRequest::Completion(_) => OperationKind::Completion,
        }
    }
}

/// Result of a polled operation's creation call.
#[derive(Debug, Clone)]
pub struct StartedOperation {
    /// Server-assigned operation id.
    pub id: String,
    /// Initial snapshot, when the backend produced one at creation.
    pub snapshot: Option<Snapshot>,
}

/// Wire access as the engine sees it.
#[async_trait]
pub trait OperationTransport: Send + Sync {
    /// Creates a polled operation (index or discovery) on the backend.
    async fn start_operation(
        &self,
        request: &OperationRequest,
    ) -> Result<StartedOperation, TransportError>;

    /// Fetches the latest full-replace snapshot for a polled operation.
    async fn fetch_status(
        &self,
        kind: OperationKind,
        operation_id: &str,
    ) -> Result<Snapshot, TransportError>;

    /// Opens the framed completion stream. Dropping the returned stream must
    /// close the underlying connection.
    async fn open_delta_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaByteStream, TransportError>;
}

/* --------------------- HTTP adapter --------------------- */

/// [`OperationTransport`] over a real [`BackendClient`].
pub struct HttpTransport {
    client: BackendClient,
}

impl HttpTransport {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationTransport for HttpTransport {
    async fn start_operation(
        &self,
        request: &OperationRequest,
    ) -> Result<StartedOperation, TransportError> {
        let created = match request {
            OperationRequest::Index(req) => self.client.start_index(req).await?,
            OperationRequest::Discovery(req) => self.client.start_discovery(req).await?,
            OperationRequest::Completion(_) => {
                return Err(TransportError::Fatal(
                    "completion operations attach a stream, not a poll loop".into(),
                ));
            }
        };
        Ok(StartedOperation {
            id: created.operation_id,
            snapshot: created
                .snapshot
                .map(|snap| normalize_snapshot(request.kind(), snap)),
        })
    }

    async fn fetch_status(
        &self,
        kind: OperationKind,
        operation_id: &str,
    ) -> Result<Snapshot, TransportError> {
        let snapshot = self.client.fetch_status(operation_id).await?;
        Ok(normalize_snapshot(kind, snapshot))
    }

    async fn open_delta_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaByteStream, TransportError> {
        let stream = self.client.open_completion_stream(request).await?;
        Ok(stream.map(|chunk| chunk.map_err(TransportError::from)).boxed())
    }
}

/* --------------------- Wire normalization --------------------- */

fn normalize_status(status: WireStatus) -> OperationStatus {
    match status {
        WireStatus::Pending => OperationStatus::Pending,
        WireStatus::Processing => OperationStatus::Processing,
        WireStatus::Completed => OperationStatus::Completed,
        WireStatus::Failed => OperationStatus::Failed,
    }
}

/// Converts a wire snapshot into the engine shape, extracting each item's
/// identity key per operation kind. Keyless items cannot be reconciled and
/// are dropped with a warning.
pub fn normalize_snapshot(kind: OperationKind, snapshot: StatusSnapshot) -> Snapshot {
    let items = snapshot
        .items
        .into_iter()
        .filter_map(|item| normalize_item(kind, item))
        .collect();
    Snapshot {
        status: normalize_status(snapshot.status),
        progress: snapshot.progress,
        total: snapshot.total,
        message: snapshot.message,
        items,
        error: snapshot.error,
    }
}

fn normalize_item(kind: OperationKind, item: WireItem) -> Option<ResultItem> {
    let key = match kind {
        OperationKind::Index => item.path.clone(),
        OperationKind::Discovery => item.url.clone(),
        OperationKind::Completion => None,
    };
    let Some(key) = key else {
        warn!(?kind, "dropping result item without an identity key");
        return None;
    };
    let label = match kind {
        OperationKind::Discovery => item.title,
        _ => None,
    };
    Some(ResultItem {
        key,
        label,
        score: item.score,
        data: serde_json::Value::Object(item.extra),
    })
}
