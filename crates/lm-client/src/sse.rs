//! Decoder for the backend's server-sent event stream.
//!
//! Every event is a single `data: {"content": "...", "done": false}` line
//! followed by a blank line. Network reads may split an event, a line, or a
//! UTF-8 sequence anywhere, so bytes are buffered until a full line is
//! available.

use serde::Deserialize;
use tracing::{trace, warn};

/// One backend message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub done: bool,
    /// Backend-side hint (`thinking` / `response`); the splitter is the
    /// authority, this is only logged.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl StreamEnvelope {
    fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    events: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the envelopes completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEnvelope> {
        self.buffer.extend_from_slice(bytes);

        let mut envelopes = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(envelope) = self.parse_line(&line[..newline]) {
                envelopes.push(envelope);
            }
        }
        envelopes
    }

    /// Parse whatever is left once the body has ended without a trailing
    /// newline.
    pub fn finish(&mut self) -> Option<StreamEnvelope> {
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    /// Number of `data:` events seen so far.
    pub fn events(&self) -> usize {
        self.events
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<StreamEnvelope> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(e) => {
                warn!(error = %e, "Invalid UTF-8 in SSE stream");
                return None;
            }
        };

        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        self.events += 1;

        if data == "[DONE]" {
            return Some(StreamEnvelope::done());
        }

        match serde_json::from_str::<StreamEnvelope>(data) {
            Ok(envelope) => {
                trace!(
                    event = self.events,
                    kind = ?envelope.kind,
                    done = envelope.done,
                    len = envelope.content.len(),
                    "SSE event"
                );
                Some(envelope)
            }
            Err(e) => {
                warn!(error = %e, data = %data, "Failed to parse SSE data");
                None
            }
        }
    }
}
