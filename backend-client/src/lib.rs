//! Typed HTTP client for the RAG backend.
//!
//! This crate owns the wire boundary: operation-creation calls, full-replace
//! status snapshots for polled operations, the framed completion byte stream,
//! and a health probe. It knows nothing about tracking or reconciliation;
//! that lives in the `ops-engine` crate.

pub mod api_types;
pub mod client;
pub mod config;
pub mod error_handler;
pub mod telemetry;

pub use api_types::{
    ChatMessage, CompletionRequest, DiscoveryRequest, IndexRequest, OperationCreated,
    StatusSnapshot, WireItem, WireStatus,
};
pub use client::{BackendClient, CompletionByteStream};
pub use config::{BackendConfig, DEFAULT_POLL_INTERVAL_MS};
pub use error_handler::{BackendError, ConfigError};
