//! Delta stream reader for completion operations.
//!
//! One task owns one stream: it drives the transport's byte chunks through
//! the frame decoder and applies every parsed event in stream order. The
//! `data: [DONE]` sentinel finishes the operation; a transport that closes
//! without it (or errors mid-stream) finishes with `Outcome::AbnormalEnd`,
//! which callers must treat as "outcome unknown", not as a server-reported
//! failure.
//!
//! Cancellation drops the stream, which closes the underlying connection;
//! no further frames are processed after the cancel flag is observed.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::frames::{self, Frame, FrameDecoder};
use crate::orchestrator::SharedOperation;
use crate::reconcile::{self, Applied};
use crate::transport::DeltaByteStream;

pub(crate) async fn run(
    mut deltas: DeltaByteStream,
    shared: Arc<SharedOperation>,
    mut cancel: watch::Receiver<bool>,
) {
    shared.publish_with(reconcile::mark_processing);

    let mut decoder = FrameDecoder::default();
    let mut skipped: u64 = 0;
    let mut saw_sentinel = false;

    'read: loop {
        if *cancel.borrow() {
            trace!("stream reader cancelled");
            return;
        }

        let chunk = tokio::select! {
            _ = cancel.changed() => {
                trace!("stream reader cancelled mid-chunk");
                return;
            }
            chunk = deltas.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for line in decoder.feed(&bytes) {
                    match frames::parse_line(&line) {
                        Frame::Delta(event) => {
                            let applied = shared
                                .publish_with(|state| reconcile::apply_delta(state, event));
                            if applied == Applied::Dropped {
                                return;
                            }
                        }
                        Frame::End => {
                            saw_sentinel = true;
                            break 'read;
                        }
                        Frame::Skipped => skipped += 1,
                        Frame::Ignored => {}
                    }
                }
            }
            Some(Err(err)) => {
                warn!(%err, "completion stream transport error");
                shared.publish_with(|state| {
                    state.skipped_frames += skipped;
                    reconcile::mark_abnormal_end(state, err.to_string());
                });
                return;
            }
            None => {
                // Transport closed; a final unterminated line may still hold
                // the sentinel or one last event.
                if let Some(line) = decoder.finish() {
                    match frames::parse_line(&line) {
                        Frame::Delta(event) => {
                            let _ = shared
                                .publish_with(|state| reconcile::apply_delta(state, event));
                        }
                        Frame::End => saw_sentinel = true,
                        Frame::Skipped => skipped += 1,
                        Frame::Ignored => {}
                    }
                }
                break 'read;
            }
        }
    }

    if *cancel.borrow() {
        return;
    }

    shared.publish_with(|state| {
        state.skipped_frames += skipped;
        if saw_sentinel {
            debug!(id = %state.id, "completion stream finished");
            reconcile::mark_stream_complete(state);
        } else {
            warn!(id = %state.id, "completion stream closed without end sentinel");
            reconcile::mark_abnormal_end(state, "stream closed before end sentinel".into());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationKind, OperationState, OperationStatus, Outcome};
    use crate::testutil::{byte_stream, pending_after};
    use crate::transport::TransportError;

    fn completion_state() -> OperationState {
        OperationState::new("sess-1", OperationKind::Completion)
    }

    #[tokio::test]
    async fn assembles_content_and_sources_until_sentinel() {
        let stream = byte_stream(vec![
            "data: {\"content\":\"Hel\"}\n",
            "data: {\"content\":\"lo\"}\n",
            "data: {\"sources\":[{\"url\":\"https://a\"},{\"url\":\"https://b\"}]}\n",
            "data: [DONE]\n",
        ]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.content, "Hello");
        let keys: Vec<_> = view.completion.sources.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["https://a", "https://b"]);
        assert_eq!(view.status, OperationStatus::Completed);
        assert_eq!(view.outcome, Some(Outcome::Completed));
    }

    #[tokio::test]
    async fn frames_split_across_chunks_reassemble() {
        let stream = byte_stream(vec![
            "data: {\"cont",
            "ent\":\"Hel\"}\ndata: {\"content\":\"lo\"}\ndata: [D",
            "ONE]\n",
        ]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.content, "Hello");
        assert_eq!(view.outcome, Some(Outcome::Completed));
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_not_fatal() {
        let stream = byte_stream(vec![
            "data: {\"content\":\"good \"}\n",
            "data: {broken json\n",
            "data: {\"content\":\"still good\"}\n",
            "data: [DONE]\n",
        ]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.content, "good still good");
        assert_eq!(view.skipped_frames, 1);
        assert_eq!(view.outcome, Some(Outcome::Completed));
    }

    #[tokio::test]
    async fn reasoning_channel_accumulates_separately() {
        let stream = byte_stream(vec![
            "data: {\"reasoning_content\":\"let me \"}\n",
            "data: {\"thinking\":\"think\"}\n",
            "data: {\"content\":\"42\"}\n",
            "data: [DONE]\n",
        ]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.reasoning, "let me think");
        assert_eq!(view.completion.content, "42");
    }

    #[tokio::test]
    async fn close_without_sentinel_is_an_abnormal_end() {
        let stream = byte_stream(vec!["data: {\"content\":\"partial\"}\n"]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.content, "partial");
        assert!(matches!(view.outcome, Some(Outcome::AbnormalEnd { .. })));
        assert_eq!(view.status, OperationStatus::Processing);
    }

    #[tokio::test]
    async fn sentinel_in_trailing_unterminated_line_counts() {
        let stream = byte_stream(vec!["data: {\"content\":\"x\"}\ndata: [DONE]"]);
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        assert_eq!(shared.current().outcome, Some(Outcome::Completed));
    }

    #[tokio::test]
    async fn mid_stream_transport_error_is_an_abnormal_end() {
        let stream = crate::testutil::byte_stream_with_error(
            vec!["data: {\"content\":\"par\"}\n"],
            TransportError::Retriable("connection reset".into()),
        );
        let shared = SharedOperation::new(completion_state());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        run(stream, shared.clone(), cancel_rx).await;

        let view = shared.current();
        assert_eq!(view.completion.content, "par");
        match view.outcome {
            Some(Outcome::AbnormalEnd { ref detail }) => {
                assert!(detail.contains("connection reset"));
            }
            ref other => panic!("expected abnormal end, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_frame_processing() {
        // A stream that delivers one frame and then stays open forever.
        let stream = pending_after(vec!["data: {\"content\":\"before\"}\n"]);
        let shared = SharedOperation::new(completion_state());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = tokio::spawn(run(stream, shared.clone(), cancel_rx));

        // Wait until the first frame is applied, then cancel.
        let mut views = shared.subscribe();
        while views.borrow_and_update().completion.content.is_empty() {
            views.changed().await.unwrap();
        }
        cancel_tx.send_replace(true);
        shared.publish_with(reconcile::mark_abandoned);
        reader.await.unwrap();

        let view = shared.current();
        assert_eq!(view.completion.content, "before");
        assert_eq!(view.outcome, Some(Outcome::Abandoned));
    }
}
