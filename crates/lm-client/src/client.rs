use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use lm_core::{ChatMessage, ChatRequest, ChatTransport, ChunkStream, Error, StreamChunk};

use crate::sse::{SseDecoder, StreamEnvelope};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// How long to wait for the backend to start answering a stream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the LearnMate backend's streaming chat endpoints.
pub struct LearnMateClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl LearnMateClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        // Configure client for proper SSE streaming:
        // - Use HTTP/1.1 to avoid HTTP/2 framing issues
        // - Disable automatic decompression which can buffer entire response
        let client = Client::builder()
            .http1_only()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|_| Client::new());

        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach `Authorization: Bearer <token>` to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Limit the wait for response headers. The body itself may stream for
    /// as long as the backend keeps sending.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, request: &ChatRequest) -> String {
        match request {
            ChatRequest::Conversation {
                conversation_id, ..
            } => format!(
                "{}/api/v1/conversations/{}/messages/stream",
                self.base_url, conversation_id
            ),
            ChatRequest::Chat { .. } => format!("{}/api/v1/chatbot/chat/stream", self.base_url),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }
}

impl Default for LearnMateClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ChatTransport for LearnMateClient {
    fn name(&self) -> &str {
        "learnmate"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, Error> {
        let url = self.endpoint(&request);
        let body = StreamRequestBody {
            messages: request.messages(),
        };
        debug!(url = %url, messages = body.messages.len(), "Sending stream request");

        let send = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("Accept-Encoding", "identity")
            .header("Cache-Control", "no-cache")
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result.map_err(request_error)?,
            Err(_) => {
                warn!(url = %url, timeout = ?self.timeout, "Stream request timed out");
                return Err(Error::timeout(format!(
                    "no response from {} after {:?}",
                    url, self.timeout
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), &error_text));
        }

        let (tx, rx) = mpsc::channel::<Result<StreamChunk, Error>>(100);

        tokio::spawn(async move {
            let stream_start = std::time::Instant::now();
            let mut decoder = SseDecoder::new();
            let mut byte_count = 0usize;
            let mut response = response;

            loop {
                let bytes = match response.chunk().await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "SSE body read failed");
                        let _ = tx.send(Err(Error::stream(e.to_string()))).await;
                        return;
                    }
                };
                byte_count += bytes.len();

                for envelope in decoder.push(&bytes) {
                    if forward(&tx, envelope).await {
                        debug!(
                            elapsed = ?stream_start.elapsed(),
                            events = decoder.events(),
                            bytes = byte_count,
                            "SSE stream complete"
                        );
                        return;
                    }
                }
            }

            if let Some(envelope) = decoder.finish() {
                if forward(&tx, envelope).await {
                    return;
                }
            }

            warn!(
                elapsed = ?stream_start.elapsed(),
                events = decoder.events(),
                bytes = byte_count,
                "SSE body ended without done signal"
            );
            let _ = tx.send(Ok(StreamChunk::Done)).await;
        });

        let stream = ReceiverStream::new(rx);
        Ok(Box::pin(stream) as ChunkStream)
    }

    async fn health(&self) -> bool {
        let request = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT);
        match request.send().await.map_err(request_error) {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                error!(error = %e, "Health check failed");
                false
            }
        }
    }
}

fn request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err.to_string())
    } else {
        Error::network(err.to_string())
    }
}

/// Send the chunks carried by one envelope. Returns true once the exchange is
/// over (done signal or receiver gone).
async fn forward(tx: &mpsc::Sender<Result<StreamChunk, Error>>, envelope: StreamEnvelope) -> bool {
    if !envelope.content.is_empty() && tx.send(Ok(StreamChunk::Delta { content: envelope.content })).await.is_err() {
        return true;
    }
    if envelope.done {
        let _ = tx.send(Ok(StreamChunk::Done)).await;
        return true;
    }
    false
}

#[derive(Debug, Serialize)]
struct StreamRequestBody {
    messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use lm_core::{run_exchange, StreamSplitter};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn serve_once(status_line: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{}",
            status_line, body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (base_url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    #[test]
    fn test_endpoints() {
        let client = LearnMateClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.endpoint(&ChatRequest::conversation("abc", "hi")),
            "http://localhost:8000/api/v1/conversations/abc/messages/stream"
        );
        assert_eq!(
            client.endpoint(&ChatRequest::chat(vec![ChatMessage::user("hi")])),
            "http://localhost:8000/api/v1/chatbot/chat/stream"
        );
    }

    #[test]
    fn test_request_body() {
        let body = StreamRequestBody {
            messages: ChatRequest::conversation("abc", "What is a monad?").messages(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"messages": [{"role": "user", "content": "What is a monad?"}]})
        );
    }

    #[tokio::test]
    async fn test_stream_splits_backend_events() {
        let body = concat!(
            "data: {\"content\": \"<thi\", \"done\": false}\n\n",
            "data: {\"content\": \"nk>hello</thi\", \"done\": false}\n\n",
            "data: {\"content\": \"nk>world\", \"done\": false}\n\n",
            "data: {\"content\": \"\", \"done\": true}\n\n",
        );
        let (base_url, server) = serve_once("200 OK", body).await;

        let client = LearnMateClient::new(base_url).with_token("secret-token");
        let stream = client
            .stream(ChatRequest::conversation("conv-1", "Hi"))
            .await
            .unwrap();

        let mut splitter = StreamSplitter::new();
        let outcome = run_exchange(stream, &mut splitter, |_| {}).await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.thinking_closed);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(outcome.accumulated.thinking, "hello");
        assert_eq!(outcome.accumulated.response, "world");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/conversations/conv-1/messages/stream "));
        assert!(request.contains("Bearer secret-token"));
        assert!(request.contains("\"content\":\"Hi\""));
    }

    #[tokio::test]
    async fn test_stream_without_done_still_terminates() {
        let (base_url, _server) =
            serve_once("200 OK", "data: {\"content\": \"partial answer\"}").await;

        let client = LearnMateClient::new(base_url);
        let chunks: Vec<_> = client
            .stream(ChatRequest::chat(vec![ChatMessage::user("Hi")]))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &StreamChunk::delta("partial answer")
        );
        assert_eq!(chunks[1].as_ref().unwrap(), &StreamChunk::Done);
    }

    #[tokio::test]
    async fn test_stream_error_status() {
        let (base_url, _server) =
            serve_once("401 Unauthorized", "{\"detail\": \"Session not found\"}").await;

        let client = LearnMateClient::new(base_url);
        let err = match client.stream(ChatRequest::conversation("c", "Hi")).await {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.is_auth_error());
        assert!(err.to_string().contains("Session not found"));
    }

    #[tokio::test]
    async fn test_stream_times_out_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        // Accept and read the request but never answer it.
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = LearnMateClient::new(base_url).with_timeout(Duration::from_millis(200));
        let err = match client.stream(ChatRequest::conversation("c", "Hi")).await {
            Err(err) => err,
            Ok(_) => panic!("expected a timeout"),
        };
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = LearnMateClient::new(format!("http://{}", addr));
        assert!(!client.health().await);
    }
}
