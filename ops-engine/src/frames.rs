//! Framing and parsing of the completion delta stream.
//!
//! The wire format is line-oriented: every event is one line starting with
//! the `data:` prefix, and the literal `data: [DONE]` line terminates the
//! stream. Frames may be split arbitrarily across transport chunks, so the
//! decoder buffers bytes until a full line is available.
//!
//! Parsing is deliberately lenient: a malformed frame is skipped (and
//! counted), never fatal. Unknown event fields are ignored, and the two
//! reasoning field names observed on the wire are normalized to one
//! canonical `reasoning` field here, before reconciliation.

use serde::Deserialize;
use tracing::debug;

use crate::operation::ResultItem;

/// Prefix carried by every event line.
pub const EVENT_PREFIX: &str = "data:";

/// Payload of the end-of-stream line (`data: [DONE]`).
pub const END_SENTINEL: &str = "[DONE]";

/// One parsed delta event. Any combination of the three channels may appear
/// in a single frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeltaEvent {
    /// Answer-text fragment, appended to the accumulated content.
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning-text fragment, appended to the reasoning channel. The wire
    /// has used more than one name for this field.
    #[serde(default, alias = "reasoning_content", alias = "thinking")]
    pub reasoning: Option<String>,
    /// Complete source set; replaces any previously seen list.
    #[serde(default)]
    pub sources: Option<Vec<SourceRef>>,
}

/// One cited source inside a delta event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRef {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl SourceRef {
    /// Normalizes into the engine's result-item shape; the URL is the
    /// identity key.
    pub fn into_result_item(self) -> ResultItem {
        let data = match self.snippet {
            Some(snippet) => serde_json::json!({ "snippet": snippet }),
            None => serde_json::Value::Null,
        };
        ResultItem {
            key: self.url,
            label: self.title,
            score: self.score,
            data,
        }
    }
}

/// Classification of one stream line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A parsed delta event.
    Delta(DeltaEvent),
    /// The end-of-stream sentinel.
    End,
    /// A prefixed line whose payload failed to parse; skipped.
    Skipped,
    /// A non-event line (blank keep-alive, comment); not counted.
    Ignored,
}

/// Incremental line splitter over transport chunks.
///
/// `feed` returns every line completed by the given chunk; `finish` drains a
/// trailing unterminated line once the transport closes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drains the trailing line, if the stream closed without a final
    /// newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Classifies one complete line.
pub fn parse_line(line: &str) -> Frame {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Frame::Ignored;
    }
    let Some(payload) = trimmed.strip_prefix(EVENT_PREFIX) else {
        return Frame::Ignored;
    };
    let payload = payload.trim();
    if payload == END_SENTINEL {
        return Frame::End;
    }
    match serde_json::from_str::<DeltaEvent>(payload) {
        Ok(event) => Frame::Delta(event),
        Err(err) => {
            debug!(%err, "skipping malformed frame");
            Frame::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_frames_split_across_chunks() {
        let mut dec = FrameDecoder::default();
        assert!(dec.feed(b"data: {\"content\"").is_empty());
        let lines = dec.feed(b": \"Hel\"}\ndata: {\"content\": \"lo\"}\n");
        assert_eq!(
            lines,
            vec![
                "data: {\"content\": \"Hel\"}".to_string(),
                "data: {\"content\": \"lo\"}".to_string(),
            ]
        );
        assert!(dec.finish().is_none());
    }

    #[test]
    fn decoder_strips_carriage_returns_and_drains_trailing_line() {
        let mut dec = FrameDecoder::default();
        let lines = dec.feed(b"data: [DONE]\r\ndata: tail");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert_eq!(dec.finish(), Some("data: tail".to_string()));
        assert!(dec.finish().is_none());
    }

    #[test]
    fn parse_classifies_lines() {
        assert_eq!(parse_line(""), Frame::Ignored);
        assert_eq!(parse_line(": keep-alive"), Frame::Ignored);
        assert_eq!(parse_line("data: [DONE]"), Frame::End);
        assert_eq!(parse_line("data:[DONE]"), Frame::End);
        assert_eq!(parse_line("data: {not json"), Frame::Skipped);
        assert_eq!(parse_line("data: \"a string\""), Frame::Skipped);

        match parse_line(r#"data: {"content":"Hi"}"#) {
            Frame::Delta(ev) => assert_eq!(ev.content.as_deref(), Some("Hi")),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn reasoning_aliases_normalize_to_one_field() {
        for raw in [
            r#"data: {"reasoning":"a"}"#,
            r#"data: {"reasoning_content":"a"}"#,
            r#"data: {"thinking":"a"}"#,
        ] {
            match parse_line(raw) {
                Frame::Delta(ev) => assert_eq!(ev.reasoning.as_deref(), Some("a"), "{raw}"),
                other => panic!("expected delta for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_fields_are_forward_compatible_noops() {
        match parse_line(r#"data: {"content":"x","speculative_field":123}"#) {
            Frame::Delta(ev) => {
                assert_eq!(ev.content.as_deref(), Some("x"));
                assert!(ev.reasoning.is_none());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn sources_normalize_with_url_as_key() {
        let raw = r#"data: {"sources":[{"url":"https://a","title":"A","snippet":"s"}]}"#;
        let Frame::Delta(ev) = parse_line(raw) else {
            panic!("expected delta");
        };
        let items: Vec<_> = ev
            .sources
            .unwrap()
            .into_iter()
            .map(SourceRef::into_result_item)
            .collect();
        assert_eq!(items[0].key, "https://a");
        assert_eq!(items[0].label.as_deref(), Some("A"));
        assert_eq!(items[0].data["snippet"], "s");
    }
}
