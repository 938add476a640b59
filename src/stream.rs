//! Decoding for the backend's streamed chat protocol.
//!
//! The server emits one JSON object per `data: ` line over
//! `text/event-stream`. Each decoded frame carries exactly one meaning:
//! content-bearing, error-terminal, or done-terminal. After a terminal frame
//! no further frames are meaningful. Malformed frames are skipped by the
//! caller without aborting the stream, so a single bad line never loses
//! previously accumulated text.

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// One decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Content(String),
    Error(String),
    Done { full_answer: Option<String> },
}

impl StreamFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done { .. })
    }
}

/// What the chat task reports back to the event loop.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A content chunk arrived.
    Delta(String),
    /// The stream finished normally.
    Done { full_answer: Option<String> },
    /// The whole body arrived at once (non-streaming fallback).
    Complete(String),
    /// Transport failure or explicit upstream error frame.
    Failed(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    full_answer: Option<String>,
}

/// Decode one SSE line into a frame.
///
/// Returns `Ok(None)` for lines that carry no frame (blank keep-alive lines,
/// non-data fields). Returns `Err` for a `data: ` line whose payload does not
/// parse or has no recognizable meaning.
pub fn decode_frame(line: &str) -> Result<Option<StreamFrame>> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return Ok(None);
    }
    let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
        return Ok(None);
    };
    let raw: RawFrame = serde_json::from_str(payload.trim())?;
    // Precedence when a frame sets several fields: error > done > content.
    if let Some(message) = raw.error {
        return Ok(Some(StreamFrame::Error(message)));
    }
    if raw.done == Some(true) {
        return Ok(Some(StreamFrame::Done {
            full_answer: raw.full_answer,
        }));
    }
    if let Some(content) = raw.content {
        return Ok(Some(StreamFrame::Content(content)));
    }
    Err(anyhow!("frame has no content, error, or done field"))
}

/// Accumulates raw network bytes and yields complete lines.
///
/// Chunk boundaries can split both lines and UTF-8 code points, so the
/// buffer is byte-oriented and decoding happens per completed line.
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed a network chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever trailing bytes never got a newline (drained at end of stream).
    pub fn remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_frame() {
        let frame = decode_frame(r#"data: {"content": "He", "done": false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, StreamFrame::Content("He".to_string()));
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_decode_done_frame_with_full_answer() {
        let frame =
            decode_frame(r#"data: {"content": "", "done": true, "full_answer": "Hello"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            frame,
            StreamFrame::Done {
                full_answer: Some("Hello".to_string())
            }
        );
        assert!(frame.is_terminal());
    }

    #[test]
    fn test_decode_error_frame() {
        let frame = decode_frame(r#"data: {"error": "backend failed", "done": true}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, StreamFrame::Error("backend failed".to_string()));
    }

    #[test]
    fn test_error_takes_precedence_over_content() {
        let frame = decode_frame(r#"data: {"content": "x", "error": "boom"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, StreamFrame::Error("boom".to_string()));
    }

    #[test]
    fn test_blank_and_non_data_lines_are_skipped() {
        assert!(decode_frame("").unwrap().is_none());
        assert!(decode_frame("\r").unwrap().is_none());
        assert!(decode_frame(": keep-alive").unwrap().is_none());
        assert!(decode_frame("event: message").unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(decode_frame("data: {not json").is_err());
        assert!(decode_frame(r#"data: {"unrelated": 1}"#).is_err());
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"data: {\"con").is_empty());
        let lines = lb.push(b"tent\": \"hi\"}\n\ndata: ");
        assert_eq!(lines, vec!["data: {\"content\": \"hi\"}".to_string(), String::new()]);
        let lines = lb.push(b"{\"done\": true}\n");
        assert_eq!(lines, vec!["data: {\"done\": true}".to_string()]);
        assert!(lb.remainder().is_none());
    }

    #[test]
    fn test_line_buffer_splits_multibyte_chunks() {
        let mut lb = LineBuffer::new();
        let msg = "data: {\"content\": \"汪汪\"}\n".as_bytes();
        // Feed one byte at a time to force splits inside the codepoints.
        let mut lines = Vec::new();
        for b in msg {
            lines.extend(lb.push(std::slice::from_ref(b)));
        }
        assert_eq!(lines.len(), 1);
        let frame = decode_frame(&lines[0]).unwrap().unwrap();
        assert_eq!(frame, StreamFrame::Content("汪汪".to_string()));
    }

    #[test]
    fn test_remainder_flushes_trailing_bytes() {
        let mut lb = LineBuffer::new();
        lb.push(b"data: {\"done\": true}");
        assert_eq!(lb.remainder(), Some("data: {\"done\": true}".to_string()));
        assert!(lb.remainder().is_none());
    }
}
