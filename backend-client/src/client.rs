//! Thin HTTP client for the RAG backend's operation API.
//!
//! Endpoints derived from [`BackendConfig::base_url`]:
//! - `POST {base}/operations/index`     creates a repository-indexing operation
//! - `POST {base}/operations/discovery` creates a source-discovery operation
//! - `GET  {base}/operations/{id}`      fetches a full-replace status snapshot
//! - `POST {base}/chat/completions`     opens the framed completion stream
//! - `GET  {base}/health`               connectivity probe
//!
//! All responses except the completion stream arrive wrapped in the backend's
//! `{success, data, error}` envelope. Status mapping is uniform: 401/403 maps
//! to [`BackendError::Unauthorized`], any other non-2xx to
//! [`BackendError::HttpStatus`] with a body snippet.
//!
//! Creation calls are not retried here; retrying is the caller's decision.

use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use reqwest::{StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::api_types::{
    ApiEnvelope, CompletionRequest, DiscoveryRequest, IndexRequest, OperationCreated,
    StatusSnapshot,
};
use crate::config::BackendConfig;
use crate::error_handler::{BackendError, Result, make_snippet, validate_http_endpoint};

/// Raw byte stream of a completion response.
pub type CompletionByteStream = BoxStream<'static, Result<Bytes>>;

/// Preconfigured client for one backend.
///
/// Reuses a single `reqwest::Client` with the configured timeout and, when an
/// API key is present, a bearer `Authorization` default header.
pub struct BackendClient {
    client: reqwest::Client,
    url_index: String,
    url_discovery: String,
    url_operations: String,
    url_completions: String,
    url_health: String,
}

impl BackendClient {
    /// Creates a new [`BackendClient`] from the given config.
    ///
    /// # Errors
    /// - [`BackendError::Config`] if the base URL is not http(s)
    /// - [`BackendError::Decode`] if the API key cannot form a valid header
    /// - [`BackendError::Transport`] if the HTTP client cannot be built
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        validate_http_endpoint("BACKEND_URL", &cfg.base_url)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(key) = &cfg.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| BackendError::Decode(format!("invalid API key header: {e}")))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()?;

        let base = cfg.base_url.trim().trim_end_matches('/').to_string();
        info!(base = %base, "backend client initialized");

        Ok(Self {
            client,
            url_index: format!("{base}/operations/index"),
            url_discovery: format!("{base}/operations/discovery"),
            url_operations: format!("{base}/operations"),
            url_completions: format!("{base}/chat/completions"),
            url_health: format!("{base}/health"),
        })
    }

    /// Creates a repository-indexing operation.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] on 401/403, [`BackendError::HttpStatus`]
    /// on other non-2xx, [`BackendError::Api`] when the envelope carries a
    /// backend failure, [`BackendError::Transport`]/[`BackendError::Decode`]
    /// on client-side problems.
    #[instrument(skip_all, fields(project = %req.project))]
    pub async fn start_index(&self, req: &IndexRequest) -> Result<OperationCreated> {
        debug!("POST {}", self.url_index);
        let resp = self.client.post(&self.url_index).json(req).send().await?;
        let resp = self.check_status(&self.url_index, resp).await?;
        self.decode_enveloped(&self.url_index, resp).await
    }

    /// Creates a source-discovery operation.
    ///
    /// # Errors
    /// Same taxonomy as [`BackendClient::start_index`].
    #[instrument(skip_all)]
    pub async fn start_discovery(&self, req: &DiscoveryRequest) -> Result<OperationCreated> {
        debug!("POST {}", self.url_discovery);
        let resp = self
            .client
            .post(&self.url_discovery)
            .json(req)
            .send()
            .await?;
        let resp = self.check_status(&self.url_discovery, resp).await?;
        self.decode_enveloped(&self.url_discovery, resp).await
    }

    /// Fetches the latest full-replace snapshot for a polled operation.
    ///
    /// # Errors
    /// Same taxonomy as [`BackendClient::start_index`].
    #[instrument(skip_all, fields(operation_id = %operation_id))]
    pub async fn fetch_status(&self, operation_id: &str) -> Result<StatusSnapshot> {
        let url = format!("{}/{operation_id}", self.url_operations);
        let resp = self.client.get(&url).send().await?;
        let resp = self.check_status(&url, resp).await?;
        self.decode_enveloped(&url, resp).await
    }

    /// Opens the completion delta stream.
    ///
    /// The HTTP status line is checked before the stream is handed out, so an
    /// authorization denial surfaces here rather than as a broken stream.
    /// Dropping the returned stream closes the underlying connection.
    ///
    /// # Errors
    /// Same taxonomy as [`BackendClient::start_index`]; mid-stream transport
    /// failures arrive as `Err` items on the stream itself.
    #[instrument(skip_all, fields(session_id = %req.session_id))]
    pub async fn open_completion_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionByteStream> {
        debug!("POST {}", self.url_completions);
        let resp = self
            .client
            .post(&self.url_completions)
            .json(req)
            .send()
            .await?;
        let resp = self.check_status(&self.url_completions, resp).await?;
        Ok(Box::pin(resp.bytes_stream().map_err(BackendError::from)))
    }

    /// Probes backend connectivity.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] or [`BackendError::HttpStatus`] per the
    /// usual status mapping; [`BackendError::Transport`] when unreachable.
    #[instrument(skip_all)]
    pub async fn health(&self) -> Result<()> {
        let resp = self.client.get(&self.url_health).send().await?;
        self.check_status(&self.url_health, resp).await?;
        Ok(())
    }

    /* --------------------- Internals --------------------- */

    async fn check_status(&self, url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::HttpStatus {
                status,
                url: url.to_string(),
                snippet: make_snippet(&text),
            });
        }
        Ok(resp)
    }

    async fn decode_enveloped<T: DeserializeOwned>(
        &self,
        url: &str,
        resp: reqwest::Response,
    ) -> Result<T> {
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("invalid envelope from {url}: {e}")))?;
        envelope.into_result()
    }
}
