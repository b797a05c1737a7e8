//! Incremental splitter for `<think>...</think>` streams.
//!
//! Reasoning models served through the LearnMate backend interleave their
//! reasoning trace with the user-facing answer in a single text stream. The
//! [`StreamSplitter`] consumes that stream chunk by chunk and separates the two
//! channels as they arrive, without assuming that a delimiter is ever delivered
//! intact inside one chunk.
//!
//! ```
//! use lm_core::StreamSplitter;
//!
//! let mut splitter = StreamSplitter::new();
//! let first = splitter.process_chunk("<thi");
//! assert!(first.is_empty());
//!
//! let second = splitter.process_chunk("nk>hello</thi");
//! assert_eq!(second.thinking, "hello");
//!
//! let third = splitter.process_chunk("nk>world");
//! assert!(third.thinking_closed);
//! assert_eq!(third.response, "world");
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Delimiter that opens the thinking region.
pub const OPEN_TAG: &str = "<think>";

/// Delimiter that closes the thinking region.
pub const CLOSE_TAG: &str = "</think>";

/// The channel the splitter is currently routing text into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    /// Outside any thinking block (initial state).
    #[default]
    Response,
    /// Between a consumed `<think>` and its not yet consumed `</think>`.
    Thinking,
}

impl Region {
    /// The delimiter that ends this region.
    fn exit_tag(self) -> &'static str {
        match self {
            Region::Response => OPEN_TAG,
            Region::Thinking => CLOSE_TAG,
        }
    }

    fn toggled(self) -> Self {
        match self {
            Region::Response => Region::Thinking,
            Region::Thinking => Region::Response,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Response => write!(f, "response"),
            Region::Thinking => write!(f, "thinking"),
        }
    }
}

/// Splitter behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Strip leading whitespace from the first non-empty emission of each
    /// channel.
    #[serde(default = "default_trim_leading_whitespace")]
    pub trim_leading_whitespace: bool,
}

fn default_trim_leading_whitespace() -> bool {
    true
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            trim_leading_whitespace: default_trim_leading_whitespace(),
        }
    }
}

impl SplitterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trim_leading_whitespace(mut self, trim: bool) -> Self {
        self.trim_leading_whitespace = trim;
        self
    }
}

/// Text produced by processing exactly one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDelta {
    /// New thinking text (empty when none was produced).
    pub thinking: String,
    /// New response text (empty when none was produced).
    pub response: String,
    /// The thinking region was closed while processing this chunk.
    pub thinking_closed: bool,
}

impl SplitDelta {
    /// True when the chunk produced no text and closed nothing.
    pub fn is_empty(&self) -> bool {
        self.thinking.is_empty() && self.response.is_empty() && !self.thinking_closed
    }
}

/// Full thinking and response history since creation or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulated {
    pub thinking: String,
    pub response: String,
}

/// Stateful per-exchange splitter.
///
/// One instance belongs to one streamed exchange. `process_chunk` takes
/// `&mut self`, so calls are serialized by construction.
#[derive(Debug, Default)]
pub struct StreamSplitter {
    config: SplitterConfig,
    /// Text not yet classified. Only ever holds a trailing partial delimiter
    /// between calls.
    pending: String,
    region: Region,
    thinking: String,
    response: String,
    chunks: usize,
    thinking_started: bool,
    response_started: bool,
}

impl StreamSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SplitterConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Classify one chunk of the stream.
    ///
    /// A chunk that is itself a JSON string literal (starts and ends with `"`)
    /// is decoded first; if decoding fails the raw chunk is used. Every
    /// delimiter found in the buffer is consumed in order, so a chunk may both
    /// close thinking and carry response text. A trailing fragment that could
    /// still grow into the next delimiter is held back until the next call or
    /// [`flush`](Self::flush).
    pub fn process_chunk(&mut self, chunk: &str) -> SplitDelta {
        self.chunks += 1;
        let decoded = decode_quoted(chunk);

        trace!(
            chunk = self.chunks,
            region = %self.region,
            pending = self.pending.len(),
            incoming = decoded.len(),
            "Splitting chunk"
        );

        self.pending.push_str(&decoded);
        let mut delta = SplitDelta::default();

        loop {
            let region = self.region;
            let tag = region.exit_tag();

            match self.pending.find(tag) {
                Some(idx) => {
                    let before: String = self.pending.drain(..idx).collect();
                    self.pending.drain(..tag.len());
                    self.emit(region, &before, &mut delta);

                    if region == Region::Thinking {
                        delta.thinking_closed = true;
                    }
                    self.region = region.toggled();
                    trace!(chunk = self.chunks, region = %self.region, "Crossed delimiter");
                }
                None => {
                    let held = partial_tag_len(&self.pending, tag);
                    let ready_len = self.pending.len() - held;
                    let ready: String = self.pending.drain(..ready_len).collect();
                    self.emit(region, &ready, &mut delta);
                    break;
                }
            }
        }

        delta
    }

    /// Emit whatever is still pending, attributed to the current region.
    ///
    /// Call once the transport signals completion; without it a partial
    /// delimiter at the very end of the stream would be dropped.
    pub fn flush(&mut self) -> SplitDelta {
        let mut delta = SplitDelta::default();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(self.region, &rest, &mut delta);
        }
        delta
    }

    /// Full thinking and response text since creation or the last reset.
    pub fn accumulated(&self) -> Accumulated {
        Accumulated {
            thinking: self.thinking.clone(),
            response: self.response.clone(),
        }
    }

    /// Return the splitter to its initial state, keeping its configuration.
    pub fn reset(&mut self) {
        trace!(
            chunks = self.chunks,
            thinking = self.thinking.len(),
            response = self.response.len(),
            "Resetting splitter"
        );
        let config = std::mem::take(&mut self.config);
        *self = Self::with_config(config);
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn is_thinking(&self) -> bool {
        self.region == Region::Thinking
    }

    /// Number of chunks processed (diagnostic only).
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    fn emit(&mut self, region: Region, text: &str, delta: &mut SplitDelta) {
        let trim = self.config.trim_leading_whitespace;
        let (started, history, out) = match region {
            Region::Thinking => (&mut self.thinking_started, &mut self.thinking, &mut delta.thinking),
            Region::Response => (&mut self.response_started, &mut self.response, &mut delta.response),
        };

        let text = if trim && !*started { text.trim_start() } else { text };
        if text.is_empty() {
            return;
        }

        *started = true;
        history.push_str(text);
        out.push_str(text);
    }
}

/// Decode a chunk that arrived as a JSON string literal.
fn decode_quoted(chunk: &str) -> std::borrow::Cow<'_, str> {
    if chunk.len() >= 2 && chunk.starts_with('"') && chunk.ends_with('"') {
        if let Ok(decoded) = serde_json::from_str::<String>(chunk) {
            return std::borrow::Cow::Owned(decoded);
        }
    }
    std::borrow::Cow::Borrowed(chunk)
}

/// Length of the longest suffix of `buffer` that is a proper prefix of `tag`.
fn partial_tag_len(buffer: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&len| buffer.ends_with(&tag[..len]))
        .unwrap_or(0)
}
