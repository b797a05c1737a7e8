//! lm-client: HTTP transport for the LearnMate backend
//!
//! This crate implements the `ChatTransport` trait over the backend's
//! server-sent event endpoints.

pub mod client;
pub mod sse;

pub use client::{LearnMateClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use sse::{SseDecoder, StreamEnvelope};
