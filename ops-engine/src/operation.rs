//! Core data model: operations, their status state machine, result items,
//! the accumulated completion message, and the view published to callers.
//!
//! Status transitions are deliberately strict. Pending and Processing are the
//! only live states; Completed, Failed and Abandoned are absorbing. Abandoned
//! is client-only: the server never reports it, it marks an operation the
//! caller stopped observing.

use serde::Serialize;

use crate::select::SelectionSet;

/// What kind of server-side job an operation tracks. Determines the observer
/// (poll loop vs. delta stream) and the reconciliation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Repository indexing; observed by polling.
    Index,
    /// Iterative source discovery; observed by polling.
    Discovery,
    /// Streaming chat completion; observed through the delta stream.
    Completion,
}

impl OperationKind {
    /// Whether this kind is observed through the poll loop.
    pub fn is_polled(self) -> bool {
        !matches!(self, OperationKind::Completion)
    }
}

/// Operation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Client-only: the caller cancelled observation. The server-side job may
    /// still be running.
    Abandoned,
}

impl OperationStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Abandoned
        )
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Re-asserting the current status is allowed (snapshots repeat it);
    /// anything backward, and anything out of a terminal state, is not.
    pub fn can_transition_to(self, next: Self) -> bool {
        use OperationStatus::*;
        if self.is_terminal() {
            return false;
        }
        if self == next {
            return true;
        }
        match (self, next) {
            (Pending, Processing | Completed | Failed | Abandoned) => true,
            (Processing, Completed | Failed | Abandoned) => true,
            _ => false,
        }
    }
}

/// One normalized result unit: an indexed file, a discovered source, or a
/// cited completion source. `key` is the identity used for upserts (file
/// path, source URL, or session id depending on the operation kind).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub key: String,
    pub label: Option<String>,
    pub score: Option<f32>,
    /// Kind-specific extras, preserved verbatim.
    pub data: serde_json::Value,
}

impl ResultItem {
    /// A bare item carrying only its identity key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            score: None,
            data: serde_json::Value::Null,
        }
    }
}

/// Accumulated output of a completion operation. `content` and `reasoning`
/// grow strictly by appending deltas in arrival order; `sources` is replaced
/// wholesale whenever the stream emits a source set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatedMessage {
    pub content: String,
    pub reasoning: String,
    pub sources: Vec<ResultItem>,
}

/// Terminal discriminator, published exactly once per operation through the
/// same channel as progress updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The server reported successful completion.
    Completed,
    /// The server reported failure; `error` carries its message.
    Failed { error: String },
    /// The caller cancelled observation; the server-side result is unknown.
    Abandoned,
    /// Authorization was denied mid-observation. The operation's server-side
    /// status is unknown; the caller must re-authenticate before restarting.
    Unauthorized,
    /// The delta stream ended without its sentinel. Distinct from `Failed`:
    /// the true outcome is unknown.
    AbnormalEnd { detail: String },
}

/// A normalized full-replace snapshot, as handed to the reconciler.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: OperationStatus,
    pub progress: u64,
    pub total: u64,
    pub message: Option<String>,
    pub items: Vec<ResultItem>,
    pub error: Option<String>,
}

impl Snapshot {
    /// A minimal snapshot carrying only a status.
    pub fn with_status(status: OperationStatus) -> Self {
        Self {
            status,
            progress: 0,
            total: 0,
            message: None,
            items: Vec::new(),
            error: None,
        }
    }
}

/// Immutable identifier for one tracked operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: String,
    pub kind: OperationKind,
}

/// Mutable tracking state for one operation. Mutated only through the
/// reconciler, by a single writer.
#[derive(Debug)]
pub struct OperationState {
    pub id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub progress: u64,
    pub total: u64,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Arrival-ordered result items, upserted by key.
    pub items: Vec<ResultItem>,
    /// Completion output; only populated for [`OperationKind::Completion`].
    pub completion: AccumulatedMessage,
    /// Caller-controlled subset of `items` keys.
    pub selection: SelectionSet,
    pub outcome: Option<Outcome>,
    /// Malformed stream frames skipped so far (diagnostic only).
    pub skipped_frames: u64,
}

impl OperationState {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: OperationStatus::Pending,
            progress: 0,
            total: 0,
            message: None,
            error: None,
            items: Vec::new(),
            completion: AccumulatedMessage::default(),
            selection: SelectionSet::default(),
            outcome: None,
            skipped_frames: 0,
        }
    }

    /// Whether this operation accepts no further updates: either the status
    /// state machine reached a terminal state, or an engine-side outcome
    /// (unauthorized, abnormal stream end) was published while the
    /// server-side status stays unknown.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.status.is_terminal()
    }

    /// Builds the cloneable view published to callers.
    pub fn view(&self) -> OperationView {
        OperationView {
            id: self.id.clone(),
            kind: self.kind,
            status: self.status,
            progress: self.progress,
            total: self.total,
            message: self.message.clone(),
            error: self.error.clone(),
            items: self.items.clone(),
            completion: self.completion.clone(),
            selected: self.selection.selected_in_order(&self.items),
            outcome: self.outcome.clone(),
            skipped_frames: self.skipped_frames,
        }
    }
}

/// Reconciled, cloneable snapshot of an operation, as observed by callers.
#[derive(Debug, Clone, Serialize)]
pub struct OperationView {
    pub id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub progress: u64,
    pub total: u64,
    pub message: Option<String>,
    pub error: Option<String>,
    pub items: Vec<ResultItem>,
    pub completion: AccumulatedMessage,
    /// Selected item keys, in item arrival order.
    pub selected: Vec<String>,
    /// Present exactly once the operation finishes, never cleared.
    pub outcome: Option<Outcome>,
    pub skipped_frames: u64,
}

impl OperationView {
    /// Progress clamped for display. Servers are not trusted to keep
    /// `progress <= total`; a zero total means the total is unknown.
    pub fn display_progress(&self) -> u64 {
        if self.total == 0 {
            self.progress
        } else {
            self.progress.min(self.total)
        }
    }

    /// Whether a terminal outcome has been published.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use OperationStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Abandoned));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Abandoned));
        // Re-asserting the current live status is fine.
        assert!(Processing.can_transition_to(Processing));
        // Backward moves are rejected.
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        use OperationStatus::*;
        for terminal in [Completed, Failed, Abandoned] {
            for next in [Pending, Processing, Completed, Failed, Abandoned] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn display_progress_clamps_to_total() {
        let mut state = OperationState::new("op", OperationKind::Index);
        state.progress = 12;
        state.total = 10;
        assert_eq!(state.view().display_progress(), 10);

        state.total = 0;
        assert_eq!(state.view().display_progress(), 12);
    }
}
