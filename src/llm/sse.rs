//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks from the network, so lines (and UTF-8
//! sequences) may be split across chunks. The decoder buffers raw bytes and
//! only emits the `data` payload of an event once the blank line that ends
//! the event has been seen.
//!
//! A single event (its unterminated line plus collected data) is capped at
//! [`MAX_EVENT_BYTES`]; a body that exceeds it is treated as malformed.

use bytes::BytesMut;

use crate::error::ModelInvocationError;

/// Upper bound on the bytes buffered for one event.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Buffers partial lines and assembles event payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    data: Vec<String>,
    data_len: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, ModelInvocationError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line)? {
                events.push(event);
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() + self.data_len > MAX_EVENT_BYTES {
            return Err(self.overflow());
        }
        Ok(events)
    }

    /// Flush an event left open when the body ended without a blank line.
    pub fn finish(&mut self) -> Result<Option<String>, ModelInvocationError> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            self.scanned = 0;
            let line = String::from_utf8_lossy(&rest);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line)? {
                return Ok(Some(event));
            }
        }
        Ok(self.dispatch())
    }

    fn process_line(&mut self, line: &str) -> Result<Option<String>, ModelInvocationError> {
        if line.is_empty() {
            return Ok(self.dispatch());
        }
        // Comment lines (keep-alives).
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_len += value.len() + 1;
            if self.data_len > MAX_EVENT_BYTES {
                return Err(self.overflow());
            }
            self.data.push(value.to_string());
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        self.data_len = 0;
        Some(payload)
    }

    fn overflow(&mut self) -> ModelInvocationError {
        self.buffer.clear();
        self.scanned = 0;
        self.data.clear();
        self.data_len = 0;
        ModelInvocationError::Malformed(format!("event exceeds {MAX_EVENT_BYTES} bytes"))
    }
}
