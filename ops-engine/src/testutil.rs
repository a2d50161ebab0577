//! Shared fakes for the in-crate test suites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::sync::Notify;

use backend_client::CompletionRequest;

use crate::operation::{OperationKind, OperationStatus, Snapshot};
use crate::transport::{
    DeltaByteStream, OperationRequest, OperationTransport, StartedOperation, TransportError,
};

/// A processing snapshot with the given progress counters.
pub(crate) fn processing(progress: u64, total: u64) -> Snapshot {
    let mut snap = Snapshot::with_status(OperationStatus::Processing);
    snap.progress = progress;
    snap.total = total;
    snap
}

/// A terminal snapshot with the given progress counters.
pub(crate) fn terminal(status: OperationStatus, progress: u64, total: u64) -> Snapshot {
    let mut snap = Snapshot::with_status(status);
    snap.progress = progress;
    snap.total = total;
    snap
}

/// One scripted reply of [`ScriptedTransport::fetch_status`].
pub(crate) enum Step {
    Snapshot(Snapshot),
    Error(TransportError),
    /// Parks the fetch until [`ScriptedTransport::release_held`], then
    /// returns the snapshot. Used to race a cancel against an in-flight
    /// response.
    Hold(Snapshot),
}

/// Transport whose status fetches replay a fixed script.
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fetches: AtomicUsize,
    release: Notify,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fetches: AtomicUsize::new(0),
            release: Notify::new(),
        }
    }

    /// How many status fetches were issued.
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Releases a fetch parked on a [`Step::Hold`].
    pub(crate) fn release_held(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl OperationTransport for ScriptedTransport {
    async fn start_operation(
        &self,
        _request: &OperationRequest,
    ) -> Result<StartedOperation, TransportError> {
        Err(TransportError::Fatal("start not scripted".into()))
    }

    async fn fetch_status(
        &self,
        _kind: OperationKind,
        _operation_id: &str,
    ) -> Result<Snapshot, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().expect("script lock").pop_front();
        match step {
            Some(Step::Snapshot(snap)) => Ok(snap),
            Some(Step::Error(err)) => Err(err),
            Some(Step::Hold(snap)) => {
                self.release.notified().await;
                Ok(snap)
            }
            None => Err(TransportError::Retriable("script exhausted".into())),
        }
    }

    async fn open_delta_stream(
        &self,
        _request: &CompletionRequest,
    ) -> Result<DeltaByteStream, TransportError> {
        Err(TransportError::Fatal("stream not scripted".into()))
    }
}

/// A finite byte stream from literal chunks.
pub(crate) fn byte_stream(chunks: Vec<&str>) -> DeltaByteStream {
    let owned: Vec<Result<Bytes, TransportError>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    stream::iter(owned).boxed()
}

/// A byte stream that yields `chunks`, then one transport error, then ends.
pub(crate) fn byte_stream_with_error(
    chunks: Vec<&str>,
    error: TransportError,
) -> DeltaByteStream {
    let mut owned: Vec<Result<Bytes, TransportError>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    owned.push(Err(error));
    stream::iter(owned).boxed()
}

/// A byte stream that yields `chunks` and then stays open forever.
pub(crate) fn pending_after(chunks: Vec<&str>) -> DeltaByteStream {
    let owned: Vec<Result<Bytes, TransportError>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    stream::iter(owned).chain(stream::pending()).boxed()
}
