//! Incremental SSE-style event parser
//!
//! Accumulates raw bytes until one complete `data:`/`event:` block terminated
//! by a blank line can be extracted; unconsumed trailing bytes are retained
//! for the next call. The `[DONE]` payload marks end-of-stream.

/// Terminal payload signalling end-of-stream
pub const DONE_PAYLOAD: &str = "[DONE]";

/// One parsed server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, when present
    pub event: Option<String>,
    /// Joined `data:` payload
    pub data: String,
}

impl SseEvent {
    /// Whether this event signals end-of-stream
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_PAYLOAD
    }

    /// Parse the data payload as JSON
    ///
    /// Most providers carry a JSON object per event; the `[DONE]` sentinel
    /// and keep-alive payloads are not JSON, so `None` is expected there.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.data).ok()
    }
}

/// Incremental parser retaining partial input between calls
///
/// Buffers raw bytes and decodes only complete blocks, so a multibyte UTF-8
/// character split across two pushes survives intact.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes into the parser
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete event, if one is buffered
    pub fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            let boundary = self.find_boundary()?;
            let (block, rest_start) = boundary;
            let raw = String::from_utf8_lossy(&self.buffer[..block]).into_owned();
            self.buffer.drain(..rest_start);

            if let Some(event) = parse_block(&raw) {
                return Some(event);
            }
            // Comment-only or empty block; keep scanning
        }
    }

    /// Drain every complete event currently buffered
    pub fn drain_events(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event() {
            events.push(event);
        }
        events
    }

    /// Bytes held back waiting for more input
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Locate the first blank-line terminator, tolerating `\r\n`
    fn find_boundary(&self) -> Option<(usize, usize)> {
        let lf = find_bytes(&self.buffer, b"\n\n").map(|i| (i, i + 2));
        let crlf = find_bytes(&self.buffer, b"\r\n\r\n").map(|i| (i, i + 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

/// First occurrence of `needle` in `haystack`
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse one blank-line-terminated block into an event
fn parse_block(raw: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // Field names we do not understand (id:, retry:, comments) are skipped
    }

    if event_type.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
    })
}
