//! The engine façade.
//!
//! One [`Orchestrator`] per caller context; it owns an explicit map from
//! operation kind to the live operation of that kind (no ambient globals).
//! Starting an operation attaches exactly one observer (a poll loop for
//! index/discovery, a delta stream reader for completion), and starting a
//! new operation of a kind implicitly abandons the previous one first.
//!
//! Reconciled views are published through a `watch` channel per operation;
//! the terminal [`Outcome`] shows up in the view exactly once and is never
//! cleared, so `wait` and UI subscribers agree on what happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StartError;
use crate::operation::{
    OperationHandle, OperationKind, OperationState, OperationView, Outcome,
};
use crate::transport::{OperationRequest, OperationTransport};
use crate::{poll, reconcile, stream};

/// Default interval between status fetches for polled operations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_500);

/// Per-operation state plus its view publisher. All mutation goes through
/// [`SharedOperation::publish_with`], which applies the change under the
/// state lock and publishes the resulting view in the same step.
pub(crate) struct SharedOperation {
    state: Mutex<OperationState>,
    views: watch::Sender<OperationView>,
}

impl SharedOperation {
    pub(crate) fn new(state: OperationState) -> Arc<Self> {
        let (views, _) = watch::channel(state.view());
        Arc::new(Self {
            state: Mutex::new(state),
            views,
        })
    }

    /// Applies `apply` to the state and publishes the updated view.
    pub(crate) fn publish_with<R>(&self, apply: impl FnOnce(&mut OperationState) -> R) -> R {
        let mut state = self.state.lock().expect("operation state lock");
        let result = apply(&mut state);
        self.views.send_replace(state.view());
        result
    }

    /// Whether the operation accepts no further updates.
    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().expect("operation state lock").is_finished()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<OperationView> {
        self.views.subscribe()
    }

    pub(crate) fn current(&self) -> OperationView {
        self.views.borrow().clone()
    }
}

struct LiveOperation {
    id: String,
    shared: Arc<SharedOperation>,
    cancel: watch::Sender<bool>,
}

impl LiveOperation {
    /// Stops the observer and records the abandonment. The cancel flag is
    /// raised before the state is marked, so an in-flight response loses the
    /// race no matter which side observes first.
    fn abandon(&self) {
        self.cancel.send_replace(true);
        self.shared.publish_with(reconcile::mark_abandoned);
    }
}

/// Starts, observes, and cancels long-running backend operations.
///
/// At most one live operation per kind exists per orchestrator instance.
/// Cancellation is purely client-side: no cancel RPC exists on the backend,
/// so an abandoned operation's server-side job may run to completion
/// unobserved. That is an accepted tradeoff, not a bug.
pub struct Orchestrator {
    transport: Arc<dyn OperationTransport>,
    poll_interval: Duration,
    live: tokio::sync::Mutex<HashMap<OperationKind, LiveOperation>>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn OperationTransport>) -> Self {
        Self::with_poll_interval(transport, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        transport: Arc<dyn OperationTransport>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            poll_interval,
            live: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Starts an operation and attaches its observer.
    ///
    /// A previous live operation of the same kind is abandoned first. If the
    /// creation call fails no operation is created, no observer is attached,
    /// and the error is returned for the caller to retry explicitly.
    ///
    /// # Errors
    /// [`StartError::Unauthorized`] when the backend denies the session,
    /// [`StartError::Creation`] for any other creation failure.
    #[instrument(skip_all, fields(kind = ?request.kind()))]
    pub async fn start(&self, request: OperationRequest) -> Result<OperationHandle, StartError> {
        let kind = request.kind();
        let mut live = self.live.lock().await;
        if let Some(previous) = live.remove(&kind) {
            debug!(id = %previous.id, "abandoning superseded operation");
            previous.abandon();
        }

        let entry = match request {
            OperationRequest::Index(_) | OperationRequest::Discovery(_) => {
                let started = self.transport.start_operation(&request).await?;
                let mut state = OperationState::new(started.id.clone(), kind);
                if let Some(snapshot) = started.snapshot {
                    let _ = reconcile::apply_snapshot(&mut state, snapshot);
                }
                let shared = SharedOperation::new(state);
                let (cancel_tx, cancel_rx) = watch::channel(false);
                tokio::spawn(poll::run(
                    self.transport.clone(),
                    shared.clone(),
                    kind,
                    started.id.clone(),
                    self.poll_interval,
                    cancel_rx,
                ));
                LiveOperation {
                    id: started.id,
                    shared,
                    cancel: cancel_tx,
                }
            }
            OperationRequest::Completion(mut req) => {
                if req.session_id.is_empty() {
                    req.session_id = Uuid::new_v4().to_string();
                }
                let delta_stream = self.transport.open_delta_stream(&req).await?;
                let shared = SharedOperation::new(OperationState::new(&req.session_id, kind));
                let (cancel_tx, cancel_rx) = watch::channel(false);
                tokio::spawn(stream::run(delta_stream, shared.clone(), cancel_rx));
                LiveOperation {
                    id: req.session_id,
                    shared,
                    cancel: cancel_tx,
                }
            }
        };

        let handle = OperationHandle {
            id: entry.id.clone(),
            kind,
        };
        live.insert(kind, entry);
        Ok(handle)
    }

    /// Subscribes to the operation's reconciled views. `None` when the
    /// handle no longer refers to a tracked operation.
    pub async fn subscribe(
        &self,
        handle: &OperationHandle,
    ) -> Option<watch::Receiver<OperationView>> {
        Some(self.shared_for(handle).await?.subscribe())
    }

    /// Current reconciled view for the handle.
    pub async fn view(&self, handle: &OperationHandle) -> Option<OperationView> {
        Some(self.shared_for(handle).await?.current())
    }

    /// Awaits the operation's terminal outcome. `None` when the handle no
    /// longer refers to a tracked operation.
    pub async fn wait(&self, handle: &OperationHandle) -> Option<Outcome> {
        let mut views = self.subscribe(handle).await?;
        loop {
            let outcome = views.borrow_and_update().outcome.clone();
            if outcome.is_some() {
                return outcome;
            }
            if views.changed().await.is_err() {
                // Publisher gone (operation superseded or disposed); the
                // last published view is still readable.
                return views.borrow().outcome.clone();
            }
        }
    }

    /// Stops observing the operation and marks it abandoned locally.
    ///
    /// The observer detaches immediately; a response already in flight is
    /// discarded. The backend is not told and its job may keep running; the
    /// only guarantee is that this orchestrator applies no further updates
    /// for the handle. Stale handles are a no-op returning `false`.
    pub async fn cancel(&self, handle: &OperationHandle) -> bool {
        let live = self.live.lock().await;
        match live.get(&handle.kind) {
            Some(op) if op.id == handle.id => {
                op.abandon();
                true
            }
            _ => false,
        }
    }

    /// Abandons every live operation. Idempotent.
    pub async fn dispose(&self) {
        let mut live = self.live.lock().await;
        for (_, op) in live.drain() {
            op.abandon();
        }
    }

    /* --------------------- Selection --------------------- */

    /// Flips one result item's selection. `false` for stale handles.
    pub async fn toggle_selection(&self, handle: &OperationHandle, key: &str) -> bool {
        let Some(shared) = self.shared_for(handle).await else {
            return false;
        };
        shared.publish_with(|state| {
            state.selection.toggle(key, &state.items);
        });
        true
    }

    /// Selects every current result item. `false` for stale handles.
    pub async fn select_all(&self, handle: &OperationHandle) -> bool {
        let Some(shared) = self.shared_for(handle).await else {
            return false;
        };
        shared.publish_with(|state| {
            state.selection.select_all(&state.items);
        });
        true
    }

    /// Clears the selection. `false` for stale handles.
    pub async fn deselect_all(&self, handle: &OperationHandle) -> bool {
        let Some(shared) = self.shared_for(handle).await else {
            return false;
        };
        shared.publish_with(|state| {
            state.selection.deselect_all();
        });
        true
    }

    /* --------------------- Internals --------------------- */

    async fn shared_for(&self, handle: &OperationHandle) -> Option<Arc<SharedOperation>> {
        let live = self.live.lock().await;
        live.get(&handle.kind)
            .filter(|op| op.id == handle.id)
            .map(|op| op.shared.clone())
    }
}
