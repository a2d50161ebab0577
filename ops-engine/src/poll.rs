//! Poll loop for index and discovery operations.
//!
//! One task owns one operation: it holds its own handle, cancellation
//! receiver, and shared state, and talks to nothing else. Each tick fetches
//! a full-replace snapshot and hands it to the reconciler; the loop exits
//! the moment a terminal snapshot is applied, so no fetch ever follows the
//! tick that observed the terminal state.
//!
//! Failure policy: transient fetch errors are absorbed (the next tick simply
//! retries); an authorization denial stops the loop and publishes
//! `Outcome::Unauthorized` without marking the operation failed, because its
//! true server-side status is unknown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::operation::OperationKind;
use crate::orchestrator::SharedOperation;
use crate::reconcile::{self, Applied};
use crate::transport::{OperationTransport, TransportError};

pub(crate) async fn run(
    transport: Arc<dyn OperationTransport>,
    shared: Arc<SharedOperation>,
    kind: OperationKind,
    operation_id: String,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *cancel.borrow() {
            trace!(id = %operation_id, "poll loop cancelled");
            return;
        }
        // Covers an operation that was already terminal at creation time.
        if shared.is_finished() {
            return;
        }

        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        // The fetch itself races the cancel flag: a cancellation arriving
        // mid-flight drops the in-flight response unapplied.
        let fetched = tokio::select! {
            _ = cancel.changed() => {
                trace!(id = %operation_id, "cancelled mid-fetch; discarding response");
                return;
            }
            fetched = transport.fetch_status(kind, &operation_id) => fetched,
        };

        match fetched {
            Ok(snapshot) => {
                if *cancel.borrow() {
                    trace!(id = %operation_id, "discarding snapshot that arrived after cancellation");
                    return;
                }
                match shared.publish_with(|state| reconcile::apply_snapshot(state, snapshot)) {
                    Applied::Terminal(outcome) => {
                        debug!(id = %operation_id, ?outcome, "operation reached terminal state");
                        return;
                    }
                    Applied::Dropped => return,
                    Applied::Progressed => {}
                }
            }
            Err(TransportError::Unauthorized(detail)) => {
                warn!(id = %operation_id, %detail, "authorization denied; stopping poll loop");
                shared.publish_with(reconcile::mark_unauthorized);
                return;
            }
            Err(err) => {
                debug!(id = %operation_id, %err, "status fetch failed; retrying on next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationState, OperationStatus, Outcome, Snapshot};
    use crate::testutil::{ScriptedTransport, Step, processing, terminal};

    const TICK: Duration = Duration::from_millis(100);

    fn spawn_poll(
        transport: Arc<ScriptedTransport>,
        state: OperationState,
    ) -> (Arc<SharedOperation>, watch::Sender<bool>) {
        let shared = SharedOperation::new(state);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(run(
            transport,
            shared.clone(),
            OperationKind::Index,
            "op-1".into(),
            TICK,
            cancel_rx,
        ));
        (shared, cancel_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_terminal_snapshot_with_no_extra_fetch() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Snapshot(processing(2, 10)),
            Step::Snapshot(terminal(OperationStatus::Completed, 10, 10)),
        ]));
        let (shared, _cancel) = spawn_poll(
            transport.clone(),
            OperationState::new("op-1", OperationKind::Index),
        );

        // Plenty of ticks beyond the terminal one.
        tokio::time::sleep(TICK * 20).await;

        assert_eq!(transport.fetches(), 2);
        let view = shared.current();
        assert_eq!(view.status, OperationStatus::Completed);
        assert_eq!(view.outcome, Some(Outcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_absorbed_and_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Error(TransportError::Retriable("503".into())),
            Step::Snapshot(processing(1, 2)),
            Step::Error(TransportError::Retriable("timeout".into())),
            Step::Snapshot(terminal(OperationStatus::Completed, 2, 2)),
        ]));
        let (shared, _cancel) = spawn_poll(
            transport.clone(),
            OperationState::new("op-1", OperationKind::Index),
        );

        tokio::time::sleep(TICK * 20).await;

        assert_eq!(transport.fetches(), 4);
        assert_eq!(shared.current().outcome, Some(Outcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_stops_without_failing_the_operation() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Snapshot(processing(1, 4)),
            Step::Error(TransportError::Unauthorized("/operations/op-1".into())),
        ]));
        let (shared, _cancel) = spawn_poll(
            transport.clone(),
            OperationState::new("op-1", OperationKind::Index),
        );

        tokio::time::sleep(TICK * 20).await;

        assert_eq!(transport.fetches(), 2);
        let view = shared.current();
        assert_eq!(view.outcome, Some(Outcome::Unauthorized));
        assert_eq!(view.status, OperationStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_the_in_flight_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Snapshot(processing(1, 10)),
            Step::Snapshot(processing(2, 10)),
            Step::Snapshot(processing(3, 10)),
            Step::Hold(processing(4, 10)),
        ]));
        let (shared, cancel) = spawn_poll(
            transport.clone(),
            OperationState::new("op-1", OperationKind::Index),
        );

        // Let ticks 1..=3 apply; tick 4 parks inside the held fetch.
        tokio::time::sleep(TICK * 4 + TICK / 2).await;
        assert_eq!(shared.current().progress, 3);
        assert_eq!(transport.fetches(), 4);

        // Cancel while tick 4's response is in flight, then release it.
        cancel.send_replace(true);
        shared.publish_with(reconcile::mark_abandoned);
        transport.release_held();
        tokio::time::sleep(TICK * 4).await;

        let view = shared.current();
        assert_eq!(view.progress, 3, "tick-4 response must not be applied");
        assert_eq!(view.status, OperationStatus::Abandoned);
        assert_eq!(view.outcome, Some(Outcome::Abandoned));
        assert_eq!(transport.fetches(), 4, "no fetch after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn already_terminal_state_issues_no_fetch() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Snapshot(processing(
            1, 2,
        ))]));
        let mut state = OperationState::new("op-1", OperationKind::Index);
        let _ = reconcile::apply_snapshot(
            &mut state,
            Snapshot::with_status(OperationStatus::Completed),
        );
        let (_shared, _cancel) = spawn_poll(transport.clone(), state);

        tokio::time::sleep(TICK * 10).await;
        assert_eq!(transport.fetches(), 0);
    }
}
