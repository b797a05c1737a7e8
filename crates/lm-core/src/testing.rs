//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Error;
use crate::message::{ChatRequest, StreamChunk};
use crate::transport::{ChatTransport, ChunkStream};

/// A mock transport that replays pre-configured chunk scripts.
pub struct MockTransport {
    scripts: Mutex<Vec<Vec<Result<StreamChunk, Error>>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<ChatRequest>>,
    pub healthy: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    /// Queue the fragments returned by the next stream() call, followed by
    /// a done signal. Scripts are replayed in FIFO order.
    pub fn queue_fragments(&self, fragments: &[&str]) {
        let mut script: Vec<Result<StreamChunk, Error>> = fragments
            .iter()
            .map(|f| Ok(StreamChunk::delta(*f)))
            .collect();
        script.push(Ok(StreamChunk::Done));
        self.queue_script(script);
    }

    /// Queue a raw script, exactly as the stream should yield it.
    pub fn queue_script(&self, script: Vec<Result<StreamChunk, Error>>) {
        self.scripts.lock().unwrap().insert(0, script);
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.scripts.lock().unwrap().pop() {
            Some(script) => Ok(Box::pin(futures::stream::iter(script))),
            None => Err(Error::invalid_request("No mock script queued")),
        }
    }

    async fn health(&self) -> bool {
        self.healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::run_exchange;
    use crate::splitter::StreamSplitter;

    #[tokio::test]
    async fn test_mock_transport_replays_in_order() {
        let transport = MockTransport::new();
        transport.queue_fragments(&["first"]);
        transport.queue_fragments(&["<think>idea</think>", "second"]);

        let mut splitter = StreamSplitter::new();
        let stream = transport.stream(ChatRequest::conversation("c-1", "hi")).await.unwrap();
        let outcome = run_exchange(stream, &mut splitter, |_| {}).await.unwrap();
        assert_eq!(outcome.accumulated.response, "first");

        splitter.reset();
        let stream = transport.stream(ChatRequest::conversation("c-1", "again")).await.unwrap();
        let outcome = run_exchange(stream, &mut splitter, |_| {}).await.unwrap();
        assert_eq!(outcome.accumulated.thinking, "idea");
        assert_eq!(outcome.accumulated.response, "second");

        assert_eq!(transport.request_count(), 2);
        assert_eq!(
            transport.last_request(),
            Some(ChatRequest::conversation("c-1", "again"))
        );
        assert!(transport.stream(ChatRequest::chat(Vec::new())).await.is_err());
    }
}
