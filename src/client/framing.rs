//! Splits a streaming response body into JSON chunk payloads.
//!
//! The platform streams run output either as server-sent events or as
//! newline-delimited JSON. Both are reduced to the same thing: a sequence of
//! raw JSON strings, one per chunk, decoded later by the run engine.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::{Error, Result};

/// Wire framing of a streaming run response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFraming {
    Sse,
    Ndjson,
    /// Pick by the response `Content-Type`.
    #[default]
    Auto,
}

impl StreamFraming {
    pub fn resolve(self, content_type: Option<&str>) -> Self {
        match self {
            Self::Auto => {
                let ct = content_type.unwrap_or_default().to_ascii_lowercase();
                if ct.contains("ndjson") || ct.contains("jsonl") || ct.starts_with("application/json")
                {
                    Self::Ndjson
                } else {
                    Self::Sse
                }
            }
            explicit => explicit,
        }
    }

    pub fn framer(self, content_type: Option<&str>) -> Box<dyn ChunkFramer> {
        match self.resolve(content_type) {
            Self::Ndjson => Box::new(NdjsonFramer::default()),
            _ => Box::new(SseFramer::default()),
        }
    }
}

/// Incremental splitter from raw bytes to chunk payloads.
///
/// Frames whose bytes are not valid UTF-8 come out as [`Error::Decode`];
/// they do not poison the frames that follow.
pub trait ChunkFramer: Send {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>>;

    /// Flush whatever is buffered once the body ends.
    fn finish(&mut self) -> Vec<Result<String>>;
}

const COMPACT_THRESHOLD: usize = 8192;

#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
    pos: usize,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        if self.pos > 0 && self.buffer.len() > COMPACT_THRESHOLD && self.pos > self.buffer.len() / 2
        {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<&[u8]> {
        let rest = &self.buffer[self.pos..];
        let rel = rest.iter().position(|b| *b == b'\n')?;
        let start = self.pos;
        self.pos += rel + 1;
        let mut line = &self.buffer[start..start + rel];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        Some(line)
    }

    fn take_rest(&mut self) -> Vec<u8> {
        let rest = self.buffer[self.pos..].to_vec();
        self.buffer.clear();
        self.pos = 0;
        rest
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Decode(format!("invalid UTF-8 in stream frame: {}", e)))
}

/// Keepalive frames carry `"type": "ping"` at the top level only.
fn is_keepalive(payload: &str) -> bool {
    payload == "[DONE]"
        || serde_json::from_str::<Value>(payload)
            .is_ok_and(|value| value.get("type").and_then(Value::as_str) == Some("ping"))
}

/// Server-sent events: blank-line separated blocks of `data:` lines.
#[derive(Debug, Default)]
pub struct SseFramer {
    lines: LineBuffer,
    data: Vec<u8>,
    has_data: bool,
}

impl SseFramer {
    fn feed_line(&mut self, line: &[u8], out: &mut Vec<Result<String>>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(b":") {
            return;
        }
        if let Some(value) = line.strip_prefix(b"data:") {
            let value = value.strip_prefix(b" ").unwrap_or(value);
            if self.has_data {
                self.data.push(b'\n');
            }
            self.data.extend_from_slice(value);
            self.has_data = true;
        }
    }

    fn dispatch(&mut self, out: &mut Vec<Result<String>>) {
        if !self.has_data {
            return;
        }
        let data = std::mem::take(&mut self.data);
        self.has_data = false;
        match decode_utf8(&data) {
            Ok(payload) => {
                if let Some(payload) = Self::keep_payload(payload) {
                    out.push(Ok(payload));
                }
            }
            Err(e) => out.push(Err(e)),
        }
    }

    fn keep_payload(payload: String) -> Option<String> {
        let trimmed = payload.trim();
        if trimmed.is_empty() || is_keepalive(trimmed) {
            return None;
        }
        Some(trimmed.to_string())
    }
}

impl ChunkFramer for SseFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.lines.extend(bytes);
        let mut out = Vec::new();
        while let Some(line) = self.lines.next_line() {
            let line = line.to_vec();
            self.feed_line(&line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<Result<String>> {
        let mut out = Vec::new();
        let rest = self.lines.take_rest();
        if !rest.is_empty() {
            let rest = rest.strip_suffix(b"\r").unwrap_or(&rest).to_vec();
            self.feed_line(&rest, &mut out);
        }
        self.dispatch(&mut out);
        out
    }
}

/// One JSON document per line.
#[derive(Debug, Default)]
pub struct NdjsonFramer {
    lines: LineBuffer,
}

impl NdjsonFramer {
    fn frame(line: &[u8]) -> Option<Result<String>> {
        match decode_utf8(line) {
            Ok(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty() && !is_keepalive(trimmed)).then(|| Ok(trimmed.to_string()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl ChunkFramer for NdjsonFramer {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.lines.extend(bytes);
        let mut out = Vec::new();
        while let Some(line) = self.lines.next_line() {
            if let Some(frame) = Self::frame(line) {
                out.push(frame);
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<Result<String>> {
        let rest = self.lines.take_rest();
        Self::frame(&rest).into_iter().collect()
    }
}

pin_project! {
    /// Adapts a byte stream into a stream of chunk payloads.
    pub struct FramedStream<S> {
        #[pin]
        inner: S,
        framer: Box<dyn ChunkFramer>,
        ready: VecDeque<Result<String>>,
        finished: bool,
    }
}

impl<S> FramedStream<S> {
    pub fn new(inner: S, framer: Box<dyn ChunkFramer>) -> Self {
        Self {
            inner,
            framer,
            ready: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for FramedStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.ready.extend(this.framer.push(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    *this.finished = true;
                    this.ready.extend(this.framer.finish());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn payloads(items: Vec<Result<String>>) -> Vec<String> {
        items.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_sse_single_event() {
        let mut framer = SseFramer::default();
        let out = framer.push(b"data: {\"type\":\"token_chunk\",\"text\":\"Hi\"}\n\n");
        assert_eq!(payloads(out), vec![r#"{"type":"token_chunk","text":"Hi"}"#]);
    }

    #[test]
    fn test_sse_split_across_pushes() {
        let mut framer = SseFramer::default();
        assert!(framer.push(b"event: message\ndata: {\"a\"").is_empty());
        assert!(framer.push(b":1}\r\n").is_empty());
        let out = framer.push(b"\r\n");
        assert_eq!(payloads(out), vec![r#"{"a":1}"#]);
    }

    #[test]
    fn test_sse_multiline_data_joined() {
        let mut framer = SseFramer::default();
        let out = framer.push(b"data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(payloads(out), vec!["{\"a\":\n1}"]);
    }

    #[test]
    fn test_sse_skips_noise() {
        let mut framer = SseFramer::default();
        let out = framer.push(b": keepalive\n\ndata: [DONE]\n\ndata: {\"type\": \"ping\"}\n\nretry: 10\n\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_sse_keeps_events_with_nested_ping() {
        let mut framer = SseFramer::default();
        let out = framer.push(
            b"data: {\"type\":\"tool_invocation\",\"tool_name\":\"net\",\"args\":{\"type\":\"ping\",\"host\":\"10.0.0.1\"}}\n\n\
              data: {\"type\":\"final_result\",\"text\":\"up\",\"metadata\":{\"health\":{\"type\": \"ping\"}}}\n\n",
        );
        let frames = payloads(out);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"tool_name\":\"net\""));
        assert!(frames[1].starts_with("{\"type\":\"final_result\""));
    }

    #[test]
    fn test_sse_flushes_unterminated_event() {
        let mut framer = SseFramer::default();
        assert!(framer.push(b"data: {\"x\":2}").is_empty());
        assert_eq!(payloads(framer.finish()), vec![r#"{"x":2}"#]);
    }

    #[test]
    fn test_sse_invalid_utf8_is_isolated() {
        let mut framer = SseFramer::default();
        let out = framer.push(b"data: \xff\xfe\n\ndata: {\"ok\":true}\n\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(Error::Decode(_))));
        assert_eq!(out[1].as_deref().unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_ndjson_lines() {
        let mut framer = NdjsonFramer::default();
        let out = framer.push(b"{\"a\":1}\n\n  {\"b\":2}\r\n{\"c\"");
        assert_eq!(payloads(out), vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert!(framer.push(b":3}").is_empty());
        assert_eq!(payloads(framer.finish()), vec![r#"{"c":3}"#]);
    }

    #[test]
    fn test_ndjson_skips_top_level_ping_only() {
        let mut framer = NdjsonFramer::default();
        let out = framer.push(
            b"{\"type\":\"ping\"}\n{\"type\":\"tool_invocation\",\"tool_name\":\"net\",\"args\":{\"type\":\"ping\"}}\n",
        );
        let frames = payloads(out);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("tool_invocation"));
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(
            StreamFraming::Auto.resolve(Some("text/event-stream; charset=utf-8")),
            StreamFraming::Sse
        );
        assert_eq!(
            StreamFraming::Auto.resolve(Some("application/x-ndjson")),
            StreamFraming::Ndjson
        );
        assert_eq!(StreamFraming::Auto.resolve(None), StreamFraming::Sse);
        assert_eq!(
            StreamFraming::Ndjson.resolve(Some("text/event-stream")),
            StreamFraming::Ndjson
        );
    }

    #[tokio::test]
    async fn test_framed_stream() {
        let body = futures::stream::iter(vec![
            Ok::<_, Error>(Bytes::from_static(b"data: {\"n\":1}\n")),
            Ok(Bytes::from_static(b"\ndata: {\"n\":2}\n\n")),
        ]);
        let framed = FramedStream::new(body, Box::new(SseFramer::default()));
        let items: Vec<String> = framed.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![r#"{"n":1}"#, r#"{"n":2}"#]);
    }

    #[tokio::test]
    async fn test_framed_stream_error_ends_stream() {
        let body = futures::stream::iter(vec![
            Ok::<_, Error>(Bytes::from_static(b"{\"n\":1}\n")),
            Err(Error::Disconnected("reset".into())),
            Ok(Bytes::from_static(b"{\"n\":2}\n")),
        ]);
        let mut framed = FramedStream::new(body, Box::new(NdjsonFramer::default()));
        assert_eq!(framed.next().await.unwrap().unwrap(), r#"{"n":1}"#);
        assert!(matches!(
            framed.next().await,
            Some(Err(Error::Disconnected(_)))
        ));
        assert!(framed.next().await.is_none());
    }
}
