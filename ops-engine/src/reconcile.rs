//! Single-writer merge rules for operation state.
//!
//! Everything that mutates an [`OperationState`] funnels through this
//! module, in arrival order, from exactly one writer at a time. Per-field
//! rules:
//!
//! | field              | rule                                          |
//! |--------------------|-----------------------------------------------|
//! | status             | forward transitions only                      |
//! | progress/total     | replace with latest (no clamping on ingest)   |
//! | message/error      | replace with latest                           |
//! | content/reasoning  | append delta text                             |
//! | sources            | replace whole list                            |
//! | items              | upsert by key, arrival order preserved        |
//!
//! Once an operation is finished, every further update is dropped whole;
//! that is what makes terminal outcomes exactly-once and makes late
//! responses racing a cancellation harmless.

use tracing::trace;

use crate::frames::DeltaEvent;
use crate::operation::{OperationState, OperationStatus, Outcome, Snapshot};

/// What applying one update did to the operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Merged; the operation is still live.
    Progressed,
    /// Merged, and the operation reached a terminal outcome.
    Terminal(Outcome),
    /// The operation was already finished; the update was dropped whole.
    Dropped,
}

/// Merges a full-replace snapshot into the state.
///
/// The selection set is intersected with the surviving item keys within the
/// same application, so callers never observe a selection referencing a
/// removed item.
pub fn apply_snapshot(state: &mut OperationState, snapshot: Snapshot) -> Applied {
    if state.is_finished() {
        return Applied::Dropped;
    }

    if state.status.can_transition_to(snapshot.status) {
        state.status = snapshot.status;
    } else {
        trace!(
            from = ?state.status,
            to = ?snapshot.status,
            "ignoring non-forward status transition"
        );
    }

    state.progress = snapshot.progress;
    state.total = snapshot.total;
    state.message = snapshot.message;
    state.error = snapshot.error;

    for item in snapshot.items {
        match state.items.iter_mut().find(|i| i.key == item.key) {
            Some(existing) => *existing = item,
            None => state.items.push(item),
        }
    }
    state.selection.reconcile(&state.items);

    match state.status {
        OperationStatus::Completed => finish(state, Outcome::Completed),
        OperationStatus::Failed => {
            let error = state
                .error
                .clone()
                .unwrap_or_else(|| "operation failed".to_string());
            finish(state, Outcome::Failed { error })
        }
        _ => Applied::Progressed,
    }
}

fn finish(state: &mut OperationState, outcome: Outcome) -> Applied {
    state.outcome = Some(outcome.clone());
    Applied::Terminal(outcome)
}

/// Merges one stream delta into the state. Text channels append, the source
/// list replaces. The first delta moves a pending operation to processing.
pub fn apply_delta(state: &mut OperationState, delta: DeltaEvent) -> Applied {
    if state.is_finished() {
        return Applied::Dropped;
    }

    if state.status == OperationStatus::Pending {
        state.status = OperationStatus::Processing;
    }

    if let Some(content) = delta.content {
        state.completion.content.push_str(&content);
    }
    if let Some(reasoning) = delta.reasoning {
        state.completion.reasoning.push_str(&reasoning);
    }
    if let Some(sources) = delta.sources {
        state.completion.sources = sources
            .into_iter()
            .map(crate::frames::SourceRef::into_result_item)
            .collect();
    }

    Applied::Progressed
}

/// Moves a pending operation to processing (stream opened).
pub fn mark_processing(state: &mut OperationState) {
    if state.is_finished() {
        return;
    }
    if state.status == OperationStatus::Pending {
        state.status = OperationStatus::Processing;
    }
}

/// Finishes a completion operation whose stream ended with the sentinel.
pub fn mark_stream_complete(state: &mut OperationState) {
    if state.is_finished() {
        return;
    }
    state.status = OperationStatus::Completed;
    state.outcome = Some(Outcome::Completed);
}

/// Finishes a completion operation whose stream ended without the sentinel.
/// The status stays non-terminal: the server-side outcome is unknown.
pub fn mark_abnormal_end(state: &mut OperationState, detail: String) {
    if state.is_finished() {
        return;
    }
    state.outcome = Some(Outcome::AbnormalEnd { detail });
}

/// Marks an operation the caller stopped observing.
pub fn mark_abandoned(state: &mut OperationState) {
    if state.is_finished() {
        return;
    }
    state.status = OperationStatus::Abandoned;
    state.outcome = Some(Outcome::Abandoned);
}

/// Records an authorization denial. The status stays non-terminal: the
/// session is invalid, the operation's server-side fate unknown.
pub fn mark_unauthorized(state: &mut OperationState) {
    if state.is_finished() {
        return;
    }
    state.outcome = Some(Outcome::Unauthorized);
}
