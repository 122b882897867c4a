//! Errors, the caller-facing response type, and the collaborator traits the
//! engine is generic over.
//!
//! Faults split into two levels: [`ChatError`] covers a single
//! request/response round trip (validation, transport, decoding), while
//! [`ExchangeError`] covers the multi-turn exchange wrapped around it
//! (tool failures, the turn bound).

use crate::api::{ChatCompletion, ChatCompletionChunk, Usage};
use crate::generation::Generation;
use crate::message::Message;
use crate::request::ChatRequest;
use crate::tool::ToolError;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Transport or backend failure while submitting a request.
    #[error("backend error: {0}")]
    BackendError(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A response could not be decoded.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The service answered with a well-formed but unusable response.
    #[error("response error: {0}")]
    ResponseError(String),

    /// The service reported an error of its own.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Reconciled options contain an invalid combination of fields.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Outbound user media carries a MIME type with no mapping rule.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A tool-response message lacks the id of the call it answers.
    #[error("tool response message is missing its tool call id")]
    MissingToolCallId,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    ChatError(#[from] ChatError),

    #[error(transparent)]
    ToolError(#[from] ToolError),

    /// The exchange hit its turn bound with tool calls still pending. The
    /// conversation accumulated so far is carried for inspection or resumption.
    #[error("reached the limit of {max_turns} turns with tool calls still pending")]
    MaxTurnsReached {
        max_turns: usize,
        conversation: Box<Vec<Message>>,
    },
}

/// A completed chat response: one generation per requested choice, plus the
/// response-level metadata the service reported.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ChatResponse {
    pub generations: Vec<Generation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ChatResponse {
    /// The first generation's text, or `""` if there are no generations.
    pub fn text(&self) -> &str {
        self.generations
            .first()
            .map(|generation| generation.text.as_str())
            .unwrap_or_default()
    }

    /// Tool calls pending across all generations.
    pub fn tool_calls(&self) -> impl Iterator<Item = &crate::message::ToolCall> {
        self.generations
            .iter()
            .flat_map(|generation| generation.tool_calls.iter())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.generations
            .iter()
            .any(|generation| !generation.tool_calls.is_empty())
    }
}

/// A lazy sequence of streamed completion chunks from the backend.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ChatError>> + Send>>;

/// The request-submission capability. Transport and auth live behind this
/// trait; the engine only sees decoded responses and chunk streams.
pub trait ChatBackend: Clone + Send + Sync {
    /// Submit a request and wait for the complete response.
    fn submit(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatCompletion, ChatError>> + Send;

    /// Submit a request and receive its chunks as they arrive. Each call
    /// produces a fresh sequence; streams are not restartable.
    fn submit_streaming(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChunkStream, ChatError>> + Send;
}

/// A caller-supplied retry capability wrapped around the non-streaming
/// submission path. The engine never retries on its own.
pub trait RetryPolicy: Send + Sync {
    fn run<T, F, Fut>(&self, operation: F) -> impl Future<Output = Result<T, ChatError>> + Send
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ChatError>> + Send;
}

/// The default retry policy: a single attempt, errors passed through.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ChatError>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ChatError>> + Send,
    {
        operation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_defaults_empty() {
        let response = ChatResponse::default();
        assert_eq!(response.text(), "");
        assert!(!response.has_tool_calls());
    }

    #[tokio::test]
    async fn test_no_retry_passes_through() {
        let policy = NoRetry;
        let ok: Result<u32, ChatError> = policy.run(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, ChatError> = policy
            .run(|| async { Err(ChatError::ProviderError("boom".into())) })
            .await;
        assert!(matches!(err, Err(ChatError::ProviderError(_))));
    }
}
