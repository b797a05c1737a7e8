//! Offline splitting of a saved model transcript.

use serde::Serialize;

use lm_core::{Accumulated, SplitDelta, SplitterConfig, StreamSplitter};

/// Result of splitting a whole transcript.
#[derive(Debug, Serialize)]
pub struct SplitReport {
    pub chunks: usize,
    pub deltas: Vec<SplitDelta>,
    pub accumulated: Accumulated,
}

/// Cut `input` into pieces of `chunk_size` characters, simulating network
/// delivery. `None` or `0` delivers the whole input as one chunk.
pub fn chunk_text(input: &str, chunk_size: Option<usize>) -> Vec<&str> {
    let size = match chunk_size {
        Some(size) if size > 0 => size,
        _ => return vec![input],
    };

    let mut chunks = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in input.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            chunks.push(&input[start..idx]);
            start = idx;
        }
    }
    if start < input.len() || chunks.is_empty() {
        chunks.push(&input[start..]);
    }
    chunks
}

/// Feed `input` through a fresh splitter and collect every non-empty delta.
pub fn split_text(input: &str, chunk_size: Option<usize>, config: SplitterConfig) -> SplitReport {
    let mut splitter = StreamSplitter::with_config(config);
    let mut deltas = Vec::new();

    for chunk in chunk_text(input, chunk_size) {
        let delta = splitter.process_chunk(chunk);
        if !delta.is_empty() {
            deltas.push(delta);
        }
    }

    let rest = splitter.flush();
    if !rest.is_empty() {
        deltas.push(rest);
    }

    SplitReport {
        chunks: splitter.chunk_count(),
        deltas,
        accumulated: splitter.accumulated(),
    }
}
