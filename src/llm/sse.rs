//! Incremental Server-Sent Events decoding.
//!
//! The provider speaks SSE over a chunked HTTP body, and chunk boundaries
//! fall anywhere — mid-line, mid-event. [`SseDecoder`] buffers bytes and
//! yields complete [`ServerEvent`]s as blank-line boundaries arrive.
//! Multi-line `data:` fields are joined with `\n`; comment lines and
//! unknown fields are ignored per the SSE spec.

/// A decoded Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The joined `data:` payload.
    pub data: String,
}

impl ServerEvent {
    /// Whether this event is the stream-terminating `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder with internal line buffering.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending_line: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        for ch in String::from_utf8_lossy(chunk).chars() {
            if ch != '\n' {
                self.pending_line.push(ch);
                continue;
            }
            let line = std::mem::take(&mut self.pending_line);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.take_line(line) {
                out.push(event);
            }
        }
        out
    }

    /// Flush any buffered, unterminated event at end of stream.
    pub fn finish(&mut self) -> Option<ServerEvent> {
        if !self.pending_line.is_empty() {
            let line = std::mem::take(&mut self.pending_line);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.take_line(line);
        }
        if self.data_lines.is_empty() {
            return None;
        }
        Some(self.emit())
    }

    /// Process one complete line; emits an event at a blank-line boundary.
    fn take_line(&mut self, line: &str) -> Option<ServerEvent> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            return Some(self.emit());
        }
        // Comment line.
        if line.starts_with(':') {
            return None;
        }
        let colon = line.find(':')?;
        let field = &line[..colon];
        let value = line[colon + 1..].strip_prefix(' ').unwrap_or(&line[colon + 1..]);
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_name = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn emit(&mut self) -> ServerEvent {
        let event = ServerEvent {
            event: self.event_name.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }
}
