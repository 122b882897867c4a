//! Tidemark is the client-side core for hosted chat-completion services:
//! a streaming aggregation engine and a bounded tool-execution loop, with
//! transport, auth and retry supplied by the caller.
//!
//! Incremental completions arrive as partial chunks (token deltas, partial
//! tool-call arguments). The [`merge`] module folds them into a coherent
//! aggregate; [`streaming::ChatStream`] re-emits the increments as they
//! arrive and finishes the aggregate into a [`ChatResponse`]. When the model
//! requests tool calls, [`exchange::ChatEngine`] executes them and resubmits
//! the results, looping until a final answer is produced or the turn bound
//! is hit.
//!
//! ```ignore
//! use tidemark::{ChatEngine, ChatOptions, ToolSet};
//!
//! let engine = ChatEngine::new(backend, ToolSet::new().add_tool(Weather))
//!     .with_defaults(ChatOptions::new().model("granite-4"));
//!
//! // Awaiting the exchange runs the tool loop to completion.
//! let response = engine.prompt("What's the weather in Boston?").await?;
//! println!("{}", response.text());
//!
//! // Or stream it, deltas surfaced as they arrive.
//! let mut events = engine.prompt("What's 2+2?").stream();
//! while let Some(event) = events.next().await { /* ... */ }
//! ```
//!
//! Callers implement [`ChatBackend`] (submit a request, return a response or
//! chunk stream) and optionally [`RetryPolicy`] and [`tool::Tool`]; the rest
//! is plain immutable data.

pub mod api;
pub mod completion;
pub mod exchange;
pub mod generation;
pub mod json_utils;
pub mod merge;
pub mod message;
pub mod options;
pub mod request;
pub mod streaming;
pub mod tool;

pub use completion::{
    ChatBackend, ChatError, ChatResponse, ChunkStream, ExchangeError, NoRetry, RetryPolicy,
};
pub use exchange::streaming::{ExchangeEvent, ExchangeStream};
pub use exchange::{ChatEngine, ChatExchange, DEFAULT_MAX_TURNS};
pub use generation::{AudioMetadata, Generation};
pub use message::{Media, MediaData, Message, ToolCall};
pub use options::{AudioFormat, ChatOptions};
pub use request::ChatRequest;
pub use streaming::{ChatStream, ChatStreamEvent};
pub use tool::{Tool, ToolDefinition, ToolExecutionResult, ToolExecutor, ToolSet};
