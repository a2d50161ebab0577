//! Wire payloads for the backend's operation API.
//!
//! Requests are serialize-only, responses deserialize-only. Polled status
//! reports are always full-replace snapshots; only the completion stream
//! delivers deltas (framed lines, parsed by the engine crate).
//!
//! Unknown response fields are ignored so the backend can grow its schema
//! without breaking older clients.

use serde::{Deserialize, Serialize};

use crate::error_handler::{BackendError, Result};

/* ==========================
Requests
========================== */

/// Request body for `POST /operations/index`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRequest {
    /// Project identifier known to the backend.
    pub project: String,
    /// Optional branch; the backend indexes its default branch otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl IndexRequest {
    /// Index the default branch of `project`.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            branch: None,
        }
    }
}

/// Request body for `POST /operations/discovery`.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryRequest {
    /// Free-text question the backend discovers sources for.
    pub query: String,
    /// Upper bound on discovered sources; backend default otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sources: Option<u32>,
}

impl DiscoveryRequest {
    /// Discover sources for `query` with the backend's default limits.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_sources: None,
        }
    }
}

/// One chat turn sent to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// A `user` turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// A `system` turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// An `assistant` turn (prior model output replayed for context).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Request body for `POST /chat/completions`.
///
/// The response is a framed delta stream, so `stream` is always `true`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Client-generated stream-session id; doubles as the operation id.
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    /// Ask the backend to ground the answer in previously discovered sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_discovery: Option<bool>,
    pub stream: bool,
}

impl CompletionRequest {
    /// Builds a streaming completion request; the session id is filled in by
    /// the orchestrator when left empty.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id: String::new(),
            messages,
            use_discovery: None,
            stream: true,
        }
    }
}

/* ==========================
Responses
========================== */

/// Server-side status of an operation, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One result unit inside a snapshot: an indexed file or a discovered
/// source. The identity key lives in `path` (index) or `url` (discovery);
/// everything else is kind-specific extra payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireItem {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    /// Remaining fields, preserved verbatim for the caller.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Full-replace status snapshot for a polled operation.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSnapshot {
    pub status: WireStatus,
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub items: Vec<WireItem>,
    /// Present only when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response body of an operation-creation call.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationCreated {
    pub operation_id: String,
    /// Initial snapshot, when the backend produces one at creation time.
    #[serde(default)]
    pub snapshot: Option<StatusSnapshot>,
}

/* ==========================
Response envelope
========================== */

/// Deserialize side of the backend's universal `{success, data, error}`
/// response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// Error payload carried by a failed envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    /// Unwraps the envelope into its payload.
    ///
    /// # Errors
    /// - [`BackendError::Api`] when the backend reported `success = false`
    /// - [`BackendError::Decode`] when a success envelope carries no data
    pub fn into_result(self) -> Result<T> {
        if self.success {
            self.data
                .ok_or_else(|| BackendError::Decode("success envelope without data".into()))
        } else {
            let err = self.error.unwrap_or(ApiErrorBody {
                code: "UNKNOWN".into(),
                message: "backend reported failure without details".into(),
            });
            Err(BackendError::Api {
                code: err.code,
                message: err.message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwraps_success() {
        let raw = r#"{"success":true,"data":{"operation_id":"op-1"}}"#;
        let env: ApiEnvelope<OperationCreated> = serde_json::from_str(raw).unwrap();
        let created = env.into_result().unwrap();
        assert_eq!(created.operation_id, "op-1");
        assert!(created.snapshot.is_none());
    }

    #[test]
    fn envelope_maps_failure_to_api_error() {
        let raw = r#"{"success":false,"error":{"code":"BAD_REQUEST","message":"no project"}}"#;
        let env: ApiEnvelope<OperationCreated> = serde_json::from_str(raw).unwrap();
        match env.into_result() {
            Err(BackendError::Api { code, .. }) => assert_eq!(code, "BAD_REQUEST"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_tolerates_unknown_fields_and_defaults() {
        let raw = r#"{"status":"processing","progress":3,"total":10,
                      "items":[{"path":"src/lib.rs","chunks":7}],
                      "server_build":"abc"}"#;
        let snap: StatusSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snap.status, WireStatus::Processing);
        assert_eq!(snap.items.len(), 1);
        assert_eq!(snap.items[0].path.as_deref(), Some("src/lib.rs"));
        assert_eq!(snap.items[0].extra["chunks"], 7);
        assert!(snap.message.is_none());
        assert!(snap.error.is_none());
    }

    #[test]
    fn completion_request_serializes_compactly() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("use_discovery").is_none());
    }
}
