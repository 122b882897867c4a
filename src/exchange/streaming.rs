//! The streaming side of an exchange: the same bounded loop, with every
//! delta surfaced in arrival order. Only each turn's fully-drained aggregate
//! is inspected for tool calls before deciding to loop.

use crate::api::Usage;
use crate::completion::{ChatBackend, ChatResponse, ExchangeError, RetryPolicy};
use crate::generation::response_from_generations;
use crate::message::Message;
use crate::options;
use crate::request::ChatRequest;
use crate::streaming::{ChatStream, ChatStreamEvent};
use crate::tool::{ToolExecutionResult, ToolExecutor};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::info_span;
use tracing_futures::Instrument;

use super::ChatExchange;

/// One item of a streamed exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeEvent {
    /// A piece of generated text.
    Content { delta: String },
    /// A piece of a tool call being streamed.
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// A tool finished; its response has been appended to the conversation.
    ToolResult {
        id: Option<String>,
        name: Option<String>,
        content: String,
    },
    /// The terminal response, with cumulative usage. Always the last item of
    /// a successful exchange.
    Final(ChatResponse),
}

pub type ExchangeStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ExchangeEvent, ExchangeError>> + Send + 'a>>;

impl<'a, B, T, P> ChatExchange<'a, B, T, P>
where
    B: ChatBackend,
    T: ToolExecutor,
    P: RetryPolicy,
{
    /// Run the exchange as a stream of events.
    pub fn stream(self) -> ExchangeStream<'a> {
        let span = info_span!(
            "chat_stream",
            "gen_ai.operation.name" = "chat",
        );

        Box::pin(
            async_stream::stream! {
                let engine = self.engine;
                let options = match options::reconcile(
                    self.options.unwrap_or_default(),
                    &engine.defaults,
                ) {
                    Ok(options) => options,
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                };
                let max_turns = self.max_turns.unwrap_or(engine.max_turns);
                let definitions = match engine.tools.resolve_tool_definitions(&options) {
                    Ok(definitions) => definitions,
                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                };

                let mut conversation = self.conversation;
                let mut usage = Usage::new();

                for turn in 0..max_turns {
                    let request = match ChatRequest::new(
                        &conversation,
                        &options,
                        definitions.clone(),
                        true,
                    ) {
                        Ok(request) => request,
                        Err(error) => {
                            yield Err(error.into());
                            return;
                        }
                    };

                    let chunks = match engine.backend.submit_streaming(request).await {
                        Ok(chunks) => chunks,
                        Err(error) => {
                            yield Err(error.into());
                            return;
                        }
                    };

                    let mut chat_stream = ChatStream::new(chunks);
                    while let Some(event) = chat_stream.next().await {
                        match event {
                            Ok(ChatStreamEvent::Content { delta }) => {
                                yield Ok(ExchangeEvent::Content { delta });
                            }
                            Ok(ChatStreamEvent::ToolCallDelta { id, name, arguments }) => {
                                yield Ok(ExchangeEvent::ToolCallDelta { id, name, arguments });
                            }
                            Err(error) => {
                                yield Err(error.into());
                                return;
                            }
                        }
                    }

                    let mut response = chat_stream.into_response();
                    usage += response.usage;
                    response.usage = usage;

                    if !engine.tools.execution_required(&options, &response) {
                        yield Ok(ExchangeEvent::Final(response));
                        return;
                    }

                    match engine
                        .tools
                        .execute_tool_calls(&conversation, &response, &options)
                        .await
                    {
                        Ok(ToolExecutionResult::ReturnDirect(generations)) => {
                            yield Ok(ExchangeEvent::Final(response_from_generations(
                                generations,
                                usage,
                            )));
                            return;
                        }
                        Ok(ToolExecutionResult::Continue(extended)) => {
                            for message in extended.iter().skip(conversation.len()) {
                                if let Message::ToolResponse { id, name, content } = message {
                                    yield Ok(ExchangeEvent::ToolResult {
                                        id: id.clone(),
                                        name: name.clone(),
                                        content: content.clone(),
                                    });
                                }
                            }
                            tracing::debug!(turn, "tool calls executed, resubmitting");
                            conversation = extended;
                        }
                        Err(error) => {
                            yield Err(error.into());
                            return;
                        }
                    }
                }

                yield Err(ExchangeError::MaxTurnsReached {
                    max_turns,
                    conversation: Box::new(conversation),
                });
            }
            .instrument(span),
        )
    }
}
