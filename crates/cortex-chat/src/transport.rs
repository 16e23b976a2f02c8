//! Decoding of agent transport payloads (JSON documents or `text/event-stream`).

use serde_json::Value;

use crate::errors::CortexError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Converts the frame into the `{event, data}` record the reducer expects.
    ///
    /// Returns `Ok(None)` for keep-alive frames (`[DONE]` or empty data).
    pub fn into_event(self) -> Result<Option<Value>, CortexError> {
        let data = self.data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }
        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            CortexError::malformed(format!("invalid JSON in SSE frame: {e}"), data)
        })?;
        let mut record = serde_json::Map::new();
        if let Some(event) = self.event {
            record.insert("event".to_string(), Value::String(event));
        }
        record.insert("data".to_string(), parsed);
        Ok(Some(Value::Object(record)))
    }
}

/// Incremental SSE decoder; tolerant of arbitrary chunk boundaries.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    (0..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Returns true for a `text/event-stream` content type, parameters allowed.
pub fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.trim_start()
            .to_ascii_lowercase()
            .starts_with("text/event-stream")
    })
}

/// Returns true when a body looks like an event stream.
pub fn looks_like_event_stream(content_type: Option<&str>, body: &str) -> bool {
    if is_event_stream(content_type) {
        return true;
    }
    let head = body.trim_start();
    head.starts_with("event:") || head.starts_with("data:") || head.starts_with(':')
}

/// Parses a full agent response body into a JSON value for the reducer.
///
/// Event-stream bodies become an array of `{event, data}` records. Any JSON
/// that does not parse is a `MalformedResponse`.
pub fn parse_agent_body(body: &str, content_type: Option<&str>) -> Result<Value, CortexError> {
    if looks_like_event_stream(content_type, body) {
        let mut decoder = SseDecoder::default();
        let mut frames = decoder.push_chunk(body.as_bytes());
        frames.extend(decoder.finish());
        let mut events = Vec::with_capacity(frames.len());
        for frame in frames {
            if let Some(event) = frame.into_event()? {
                events.push(event);
            }
        }
        return Ok(Value::Array(events));
    }
    serde_json::from_str(body)
        .map_err(|e| CortexError::malformed(format!("failed to parse API response: {e}"), body))
}
