use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Error;
use crate::message::{ChatRequest, StreamChunk};

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>;

/// The network side of an exchange: turns a request into a stream of raw
/// text fragments terminated by [`StreamChunk::Done`].
///
/// Framing (SSE `data:` lines, JSON envelopes) is the transport's business;
/// only plain fragments reach the splitter.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, Error>;

    /// Whether the backend answers its health endpoint.
    async fn health(&self) -> bool;
}
