//! Exchange trace module.
//!
//! Writes JSON lines to a file describing each streamed exchange: what was
//! sent, how every fragment was split, and the final accumulated lengths.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use lm_core::{ChatRequest, ExchangeOutcome, SplitDelta};

const PREVIEW_CHARS: usize = 100;

/// Exchange logger that writes JSON lines to a file.
pub struct ExchangeLog {
    writer: Mutex<BufWriter<File>>,
}

impl ExchangeLog {
    /// Create a new exchange log appending to the specified file.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn log<T: Serialize>(&self, event_type: &str, data: T) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            data: serde_json::to_value(data).unwrap_or_default(),
        };

        if let Ok(mut writer) = self.writer.lock() {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    /// Log the request that opens an exchange.
    pub fn log_request_sent(&self, transport: &str, request: &ChatRequest) {
        let conversation_id = match request {
            ChatRequest::Conversation {
                conversation_id, ..
            } => Some(conversation_id.clone()),
            ChatRequest::Chat { .. } => None,
        };
        let messages = request.messages();
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

        self.log(
            "request_sent",
            RequestSentEvent {
                transport: transport.to_string(),
                conversation_id,
                message_count: messages.len(),
                content_preview: preview(last),
            },
        );
    }

    /// Log one split delta.
    pub fn log_chunk_split(&self, index: usize, delta: &SplitDelta) {
        self.log(
            "chunk_split",
            ChunkSplitEvent {
                index,
                thinking_length: delta.thinking.len(),
                response_length: delta.response.len(),
            },
        );
        if delta.thinking_closed {
            self.log("thinking_closed", ThinkingClosedEvent { index });
        }
    }

    /// Log the final accumulated state of an exchange.
    pub fn log_exchange_complete(&self, outcome: &ExchangeOutcome) {
        self.log(
            "exchange_complete",
            ExchangeCompleteEvent {
                chunks: outcome.chunks,
                completed: outcome.completed,
                thinking_closed: outcome.thinking_closed,
                thinking_length: outcome.accumulated.thinking.len(),
                response_length: outcome.accumulated.response.len(),
                response_preview: preview(&outcome.accumulated.response),
            },
        );
    }

    /// Log an exchange that failed midway.
    pub fn log_exchange_failed(&self, error: &str) {
        self.log(
            "exchange_failed",
            ExchangeFailedEvent {
                error: error.to_string(),
            },
        );
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    event_type: String,
    data: serde_json::Value,
}

#[derive(Serialize)]
struct RequestSentEvent {
    transport: String,
    conversation_id: Option<String>,
    message_count: usize,
    content_preview: String,
}

#[derive(Serialize)]
struct ChunkSplitEvent {
    index: usize,
    thinking_length: usize,
    response_length: usize,
}

#[derive(Serialize)]
struct ThinkingClosedEvent {
    index: usize,
}

#[derive(Serialize)]
struct ExchangeCompleteEvent {
    chunks: usize,
    completed: bool,
    thinking_closed: bool,
    thinking_length: usize,
    response_length: usize,
    response_preview: String,
}

#[derive(Serialize)]
struct ExchangeFailedEvent {
    error: String,
}
