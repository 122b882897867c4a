//! The tool-execution loop around a conversation.
//!
//! A [`ChatEngine`] ties a backend, a tool executor and a retry policy
//! together; [`ChatExchange`] is the builder for one user-initiated exchange.
//! Awaiting the exchange runs the loop to its terminal response; calling
//! [`ChatExchange::stream`] runs the same loop with every delta surfaced as
//! it arrives.
//!
//! The loop is iterative and bounded: each turn submits the conversation,
//! inspects the response for pending tool calls, executes them, and either
//! terminates or resubmits the extended conversation. Exceeding the turn
//! bound is an error carrying the conversation so far, never a silent
//! truncation.

pub mod streaming;

use crate::api::Usage;
use crate::completion::{
    ChatBackend, ChatResponse, ExchangeError, NoRetry, RetryPolicy,
};
use crate::generation::{response_from_completion, response_from_generations};
use crate::message::Message;
use crate::options::{self, ChatOptions};
use crate::request::ChatRequest;
use crate::tool::{ToolExecutionResult, ToolExecutor};
use futures::future::BoxFuture;
use tracing::{Instrument, info_span};

/// Default bound on model round trips within one exchange.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// A configured chat client: backend + tools + retry policy + default
/// options.
#[derive(Clone)]
pub struct ChatEngine<B, T, P = NoRetry> {
    backend: B,
    tools: T,
    retry: P,
    defaults: ChatOptions,
    max_turns: usize,
}

impl<B, T> ChatEngine<B, T, NoRetry>
where
    B: ChatBackend,
    T: ToolExecutor,
{
    pub fn new(backend: B, tools: T) -> Self {
        ChatEngine {
            backend,
            tools,
            retry: NoRetry,
            defaults: ChatOptions::default(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl<B, T, P> ChatEngine<B, T, P>
where
    B: ChatBackend,
    T: ToolExecutor,
    P: RetryPolicy,
{
    /// Wrap the non-streaming submission path in a retry policy.
    pub fn with_retry<P2: RetryPolicy>(self, retry: P2) -> ChatEngine<B, T, P2> {
        ChatEngine {
            backend: self.backend,
            tools: self.tools,
            retry,
            defaults: self.defaults,
            max_turns: self.max_turns,
        }
    }

    /// Engine-level default options, layered under each exchange's runtime
    /// options.
    pub fn with_defaults(mut self, defaults: ChatOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Start an exchange over an existing conversation.
    pub fn chat(&self, conversation: Vec<Message>) -> ChatExchange<'_, B, T, P> {
        ChatExchange {
            engine: self,
            conversation,
            options: None,
            max_turns: None,
        }
    }

    /// Start an exchange from a single user prompt.
    pub fn prompt(&self, text: impl Into<String>) -> ChatExchange<'_, B, T, P> {
        self.chat(vec![Message::user(text)])
    }
}

/// One user-initiated exchange being built up. Await it for the terminal
/// response, or call [`stream`](Self::stream) for the delta stream.
pub struct ChatExchange<'a, B, T, P> {
    engine: &'a ChatEngine<B, T, P>,
    conversation: Vec<Message>,
    options: Option<ChatOptions>,
    max_turns: Option<usize>,
}

impl<'a, B, T, P> ChatExchange<'a, B, T, P>
where
    B: ChatBackend,
    T: ToolExecutor,
    P: RetryPolicy,
{
    /// Runtime options for this exchange, layered over the engine defaults.
    pub fn options(mut self, options: ChatOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    async fn send(self) -> Result<ChatResponse, ExchangeError> {
        let engine = self.engine;
        let options =
            options::reconcile(self.options.unwrap_or_default(), &engine.defaults)?;
        let max_turns = self.max_turns.unwrap_or(engine.max_turns);
        let definitions = engine.tools.resolve_tool_definitions(&options)?;

        let mut conversation = self.conversation;
        let mut usage = Usage::new();

        for turn in 0..max_turns {
            let request =
                ChatRequest::new(&conversation, &options, definitions.clone(), false)
                    .map_err(ExchangeError::from)?;

            let span = info_span!(
                "chat",
                "gen_ai.operation.name" = "chat",
                "gen_ai.request.model" = options.model.as_deref().unwrap_or_default(),
                turn,
            );
            let completion = engine
                .retry
                .run(|| engine.backend.submit(request.clone()))
                .instrument(span)
                .await
                .map_err(ExchangeError::from)?;

            let mut response =
                response_from_completion(completion, &options).map_err(ExchangeError::from)?;
            usage += response.usage;
            response.usage = usage;

            if !engine.tools.execution_required(&options, &response) {
                return Ok(response);
            }

            match engine
                .tools
                .execute_tool_calls(&conversation, &response, &options)
                .await?
            {
                ToolExecutionResult::ReturnDirect(generations) => {
                    return Ok(response_from_generations(generations, usage));
                }
                ToolExecutionResult::Continue(extended) => {
                    tracing::debug!(turn, "tool calls executed, resubmitting");
                    conversation = extended;
                }
            }
        }

        Err(ExchangeError::MaxTurnsReached {
            max_turns,
            conversation: Box::new(conversation),
        })
    }
}

impl<'a, B, T, P> IntoFuture for ChatExchange<'a, B, T, P>
where
    B: ChatBackend + 'a,
    T: ToolExecutor + 'a,
    P: RetryPolicy + 'a,
{
    type Output = Result<ChatResponse, ExchangeError>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}
