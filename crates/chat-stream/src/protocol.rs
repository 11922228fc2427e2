//! Wire protocol of the chat stream.
//!
//! Each meaningful line is `data: <payload>`; other lines (blank separators,
//! comments) are ignored. Payloads are matched by literal prefix, in order:
//! `[DONE]`, `THREAD_ID:`, `EVENT:THINKING:`, `EVENT:SOURCES:`, any other
//! `EVENT:` control record (dropped), and finally token content.
use tracing::{debug, warn};

use crate::source::Source;

/// Line prefix carrying a record.
pub const DATA_PREFIX: &str = "data:";
/// End-of-stream sentinel payload.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Thread assignment tag.
pub const THREAD_ID_TAG: &str = "THREAD_ID:";
/// Progress step tag.
pub const THINKING_TAG: &str = "EVENT:THINKING:";
/// Source list tag.
pub const SOURCES_TAG: &str = "EVENT:SOURCES:";
/// Prefix shared by every control record.
pub const CONTROL_TAG: &str = "EVENT:";

/// A classified protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Done,
    ThreadId(String),
    Thinking(String),
    Sources(Vec<Source>),
    Token(String),
}

/// Splits a byte stream into lines across arbitrary chunk boundaries.
///
/// Lines are cut on `\n` before decoding. A UTF-8 sequence never contains
/// that byte, so a character split between chunks stays in the buffer until
/// its line is complete.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Appends a chunk and returns every line it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Returns the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = decode_line(&self.buf);
        self.buf.clear();
        Some(line)
    }

    /// Bytes held for an incomplete line.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Classifies one complete line. Returns `None` for lines that carry nothing.
pub fn parse_line(line: &str) -> Option<Record> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    classify_payload(payload)
}

/// Classifies a payload with the `data:` marker already removed.
pub fn classify_payload(payload: &str) -> Option<Record> {
    if payload == DONE_SENTINEL {
        return Some(Record::Done);
    }
    if let Some(rest) = payload.strip_prefix(THREAD_ID_TAG) {
        let thread_id = rest.trim();
        if thread_id.is_empty() {
            debug!("ignoring empty thread id record");
            return None;
        }
        return Some(Record::ThreadId(thread_id.to_string()));
    }
    if let Some(rest) = payload.strip_prefix(THINKING_TAG) {
        return Some(Record::Thinking(rest.trim().to_string()));
    }
    if let Some(rest) = payload.strip_prefix(SOURCES_TAG) {
        return match serde_json::from_str::<Vec<Source>>(rest.trim()) {
            Ok(sources) => Some(Record::Sources(sources)),
            Err(e) => {
                warn!(error = %e, bytes = rest.len(), "dropping malformed sources record");
                None
            }
        };
    }
    if payload.starts_with(CONTROL_TAG) {
        debug!(payload, "dropping unknown control record");
        return None;
    }
    let text = token_text(payload);
    if text.is_empty() {
        return None;
    }
    Some(Record::Token(text))
}

/// `{"token": "..."}` yields the field; anything else is taken verbatim.
fn token_text(payload: &str) -> String {
    if payload.starts_with('{')
        && let Ok(serde_json::Value::Object(map)) = serde_json::from_str(payload)
        && let Some(serde_json::Value::String(token)) = map.get("token")
    {
        return token.clone();
    }
    payload.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_partial_chunk_boundaries() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"token\":\"hel").is_empty());
        assert_eq!(decoder.buffered_len(), 19);
        let lines = decoder.push_chunk(b"lo\"}\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"token\":\"hello\"}".to_string(), String::new()]);
        assert_eq!(decoder.finish().as_deref(), Some("data: [DO"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_reassembles_split_codepoint() {
        let bytes = "data: café ☕\n".as_bytes();
        let split = bytes.len() - 3;
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(&bytes[..split]).is_empty());
        let lines = decoder.push_chunk(&bytes[split..]);
        assert_eq!(lines, vec!["data: café ☕".to_string()]);
    }

    #[test]
    fn decoder_strips_carriage_returns() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"data: a\r\ndata: b\r\n");
        assert_eq!(lines, vec!["data: a".to_string(), "data: b".to_string()]);
    }

    #[test]
    fn classifies_each_tag() {
        assert_eq!(parse_line("data: [DONE]"), Some(Record::Done));
        assert_eq!(
            parse_line("data: THREAD_ID:abc123"),
            Some(Record::ThreadId("abc123".into()))
        );
        assert_eq!(
            parse_line("data: EVENT:THINKING:Searching your academic vault..."),
            Some(Record::Thinking("Searching your academic vault...".into()))
        );
        assert_eq!(
            parse_line(r#"data: EVENT:SOURCES:[{"title":"Syllabus"}]"#),
            Some(Record::Sources(vec![Source::new("Syllabus")]))
        );
        assert_eq!(
            parse_line(r#"data: {"token":"Hello "}"#),
            Some(Record::Token("Hello ".into()))
        );
    }

    #[test]
    fn ignores_lines_without_data_prefix() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
    }

    #[test]
    fn malformed_sources_are_dropped() {
        assert_eq!(parse_line("data: EVENT:SOURCES:[{\"title\":"), None);
        assert_eq!(parse_line("data: EVENT:SOURCES:{\"title\":\"x\"}"), None);
    }

    #[test]
    fn unknown_control_records_are_dropped() {
        assert_eq!(parse_line("data: EVENT:USAGE:{\"tokens\":12}"), None);
        assert_eq!(parse_line("data: EVENT:"), None);
    }

    #[test]
    fn non_token_payloads_fall_back_to_raw_text() {
        assert_eq!(
            parse_line("data: plain words"),
            Some(Record::Token("plain words".into()))
        );
        assert_eq!(
            parse_line(r#"data: {"token": 5}"#),
            Some(Record::Token(r#"{"token": 5}"#.into()))
        );
        assert_eq!(
            parse_line(r#"data: {"token":"unterminated"#),
            Some(Record::Token(r#"{"token":"unterminated"#.into()))
        );
    }

    #[test]
    fn empty_payloads_emit_nothing() {
        assert_eq!(parse_line("data:"), None);
        assert_eq!(parse_line("data:    "), None);
        assert_eq!(parse_line(r#"data: {"token":""}"#), None);
        assert_eq!(parse_line("data: THREAD_ID:  "), None);
    }

    #[test]
    fn sentinel_must_match_exactly() {
        assert_eq!(
            parse_line("data: [DONE] trailing"),
            Some(Record::Token("[DONE] trailing".into()))
        );
    }
}
