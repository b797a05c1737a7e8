//! One streamed exchange from request to rendered output.

use std::io::Write;

use anyhow::{Context, Result};

use lm_core::{run_exchange, ChatRequest, ChatTransport, ExchangeOutcome, StreamSplitter};

use crate::exchange_log::ExchangeLog;
use crate::render::TerminalRenderer;

/// Send `request`, split the reply as it streams in and render it live.
pub async fn run_streamed<W: Write>(
    transport: &dyn ChatTransport,
    request: ChatRequest,
    splitter: &mut StreamSplitter,
    renderer: &mut TerminalRenderer<W>,
    log: Option<&ExchangeLog>,
) -> Result<ExchangeOutcome> {
    if let Some(log) = log {
        log.log_request_sent(transport.name(), &request);
    }

    let stream = match transport.stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            if let Some(log) = log {
                log.log_exchange_failed(&e.to_string());
            }
            return Err(e).context("Failed to start stream");
        }
    };

    let mut index = 0usize;
    let mut write_error = None;
    let result = run_exchange(stream, splitter, |delta| {
        index += 1;
        if let Some(log) = log {
            log.log_chunk_split(index, delta);
        }
        if write_error.is_none() {
            if let Err(e) = renderer.render(delta) {
                write_error = Some(e);
            }
        }
    })
    .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = renderer.finish();
            if let Some(log) = log {
                log.log_exchange_failed(&e.to_string());
            }
            return Err(e).context("Stream interrupted");
        }
    };

    if let Some(e) = write_error {
        return Err(e).context("Failed to write output");
    }
    renderer.finish().context("Failed to write output")?;

    if let Some(log) = log {
        log.log_exchange_complete(&outcome);
    }

    tracing::info!(
        chunks = outcome.chunks,
        completed = outcome.completed,
        thinking_length = outcome.accumulated.thinking.len(),
        response_length = outcome.accumulated.response.len(),
        "Exchange finished"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_core::testing::MockTransport;
    use lm_core::{Error, StreamChunk};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_run_streamed_renders_and_logs() {
        let transport = MockTransport::new();
        transport.queue_fragments(&["Hello ", "<think>pondering", "...</think> world!"]);

        let temp = NamedTempFile::new().unwrap();
        let log = ExchangeLog::new(temp.path()).unwrap();
        let mut splitter = StreamSplitter::new();
        let mut renderer = TerminalRenderer::new(Vec::new(), true, false);

        let outcome = run_streamed(
            &transport,
            ChatRequest::conversation("c-1", "Hi"),
            &mut splitter,
            &mut renderer,
            Some(&log),
        )
        .await
        .unwrap();

        assert_eq!(outcome.accumulated.thinking, "pondering...");
        assert_eq!(outcome.accumulated.response, "Hello  world!");
        assert_eq!(
            String::from_utf8(renderer.into_inner()).unwrap(),
            "Hello \nThinking:\npondering...\n────────\n world!\n"
        );

        drop(log);
        let trace = std::fs::read_to_string(temp.path()).unwrap();
        assert_eq!(trace.lines().count(), 6);
        assert!(trace.contains("\"exchange_complete\""));
        assert_eq!(
            transport.last_request(),
            Some(ChatRequest::conversation("c-1", "Hi"))
        );
    }

    #[tokio::test]
    async fn test_run_streamed_reports_stream_error() {
        let transport = MockTransport::new();
        transport.queue_script(vec![
            Ok(StreamChunk::delta("Partial")),
            Err(Error::network("connection reset")),
        ]);

        let mut splitter = StreamSplitter::new();
        let mut renderer = TerminalRenderer::new(Vec::new(), true, false);
        let err = run_streamed(
            &transport,
            ChatRequest::chat(vec![lm_core::ChatMessage::user("Hi")]),
            &mut splitter,
            &mut renderer,
            None,
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("connection reset"));
        assert_eq!(String::from_utf8(renderer.into_inner()).unwrap(), "Partial\n");
    }

    #[tokio::test]
    async fn test_run_streamed_start_failure() {
        let transport = MockTransport::new();
        let mut splitter = StreamSplitter::new();
        let mut renderer = TerminalRenderer::new(Vec::new(), true, false);

        let err = run_streamed(
            &transport,
            ChatRequest::conversation("c-1", "Hi"),
            &mut splitter,
            &mut renderer,
            None,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to start stream"));
    }
}
