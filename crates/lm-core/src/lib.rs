//! lm-core: Core types for the LearnMate chat client
//!
//! This crate provides the thinking/response stream splitter and the types
//! that connect it to a streaming transport.

pub mod error;
pub mod exchange;
pub mod message;
pub mod splitter;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use exchange::{run_exchange, ExchangeOutcome};
pub use message::{ChatMessage, ChatRequest, Role, StreamChunk};
pub use splitter::{
    Accumulated, Region, SplitDelta, SplitterConfig, StreamSplitter, CLOSE_TAG, OPEN_TAG,
};
pub use transport::{ChatTransport, ChunkStream};

pub type Result<T> = std::result::Result<T, Error>;
