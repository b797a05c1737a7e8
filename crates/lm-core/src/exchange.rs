//! Drives one streamed exchange through a [`StreamSplitter`].

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::message::StreamChunk;
use crate::splitter::{Accumulated, SplitDelta, StreamSplitter};
use crate::transport::ChunkStream;

/// Final bookkeeping for a finished exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeOutcome {
    pub accumulated: Accumulated,
    /// Fragments received from the transport.
    pub chunks: usize,
    /// A thinking block was opened and closed during the exchange.
    pub thinking_closed: bool,
    /// The transport sent an explicit done signal (as opposed to the stream
    /// simply ending).
    pub completed: bool,
}

/// Pump `stream` until it signals completion, feeding every fragment to
/// `splitter` and handing each non-empty delta to `on_delta`.
///
/// Pending text is flushed once the stream is done, so nothing buffered at
/// the end of the exchange is lost. A transport error aborts the exchange;
/// the splitter keeps what it had accumulated so far.
pub async fn run_exchange<F>(
    mut stream: ChunkStream,
    splitter: &mut StreamSplitter,
    mut on_delta: F,
) -> Result<ExchangeOutcome, Error>
where
    F: FnMut(&SplitDelta),
{
    let mut chunks = 0usize;
    let mut thinking_closed = false;
    let mut completed = false;

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(chunk = chunks, error = %e, "Stream aborted");
                return Err(e);
            }
        };

        match chunk {
            StreamChunk::Delta { content } => {
                chunks += 1;
                trace!(chunk = chunks, content = %content, "Fragment received");

                let delta = splitter.process_chunk(&content);
                thinking_closed |= delta.thinking_closed;

                debug!(
                    chunk = chunks,
                    thinking = delta.thinking.len(),
                    response = delta.response.len(),
                    thinking_closed = delta.thinking_closed,
                    "Fragment split"
                );

                if !delta.is_empty() {
                    on_delta(&delta);
                }
            }
            StreamChunk::Done => {
                completed = true;
                break;
            }
        }
    }

    let rest = splitter.flush();
    if !rest.is_empty() {
        on_delta(&rest);
    }

    let accumulated = splitter.accumulated();
    debug!(
        chunks,
        completed,
        thinking = accumulated.thinking.len(),
        response = accumulated.response.len(),
        "Exchange finished"
    );

    Ok(ExchangeOutcome {
        accumulated,
        chunks,
        thinking_closed,
        completed,
    })
}
