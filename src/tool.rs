//! Tools the model can call, and the default executor over them.
//!
//! [`ToolExecutor`] is the capability the exchange loop drives; [`ToolSet`]
//! is its ready-made implementation over registered [`Tool`]s. Per-call
//! failures (unknown tool, malformed arguments, execution error) are
//! reported back to the model as the tool's response text rather than
//! aborting the exchange.

use crate::completion::ChatResponse;
use crate::generation::Generation;
use crate::message::{Message, ToolCall};
use crate::options::ChatOptions;
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{Instrument, info_span};

const DEFAULT_TOOL_CONCURRENCY: usize = 4;

/// Finish reason stamped on generations produced by return-direct tools.
pub const FINISH_REASON_RETURN_DIRECT: &str = "return_direct";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFoundError(String),

    /// Argument text still failed to parse after normalization.
    #[error("malformed arguments for tool {name}: {source}")]
    MalformedArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tool call error: {0}")]
    ToolCallError(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// A tool as advertised to the model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: serde_json::Value,
}

/// An executable tool. Object-safe so a [`ToolSet`] can hold a mixed bag.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Execute with parsed arguments and the exchange's tool context.
    fn call(
        &self,
        arguments: serde_json::Value,
        context: HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<String, ToolError>>;

    /// When `true`, this tool's output is the final answer: the loop ends
    /// without resubmitting to the model.
    fn return_direct(&self) -> bool {
        false
    }
}

/// What the executor decided after running a turn's tool calls.
#[derive(Debug)]
pub enum ToolExecutionResult {
    /// Tool output is packaged straight into generations; the exchange is
    /// over.
    ReturnDirect(Vec<Generation>),
    /// The extended conversation (caller's messages + the assistant's
    /// tool-call message + tool responses); the loop resubmits it.
    Continue(Vec<Message>),
}

/// The tool-calling capability the exchange loop is generic over.
pub trait ToolExecutor: Send + Sync {
    /// The tool definitions to advertise for the given options.
    fn resolve_tool_definitions(
        &self,
        options: &ChatOptions,
    ) -> Result<Vec<ToolDefinition>, ToolError>;

    /// Whether the loop should execute tools and resubmit. The default: the
    /// response carries tool calls and internal execution was not disabled.
    fn execution_required(&self, options: &ChatOptions, response: &ChatResponse) -> bool {
        options.internal_tool_execution.unwrap_or(true) && response.has_tool_calls()
    }

    fn execute_tool_calls(
        &self,
        conversation: &[Message],
        response: &ChatResponse,
        options: &ChatOptions,
    ) -> impl Future<Output = Result<ToolExecutionResult, ToolError>> + Send;
}

/// A registry of tools with concurrent execution within a turn.
#[derive(Default)]
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    concurrency: usize,
}

impl ToolSet {
    pub fn new() -> Self {
        ToolSet {
            tools: HashMap::new(),
            concurrency: DEFAULT_TOOL_CONCURRENCY,
        }
    }

    pub fn add_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(tool.definition().name, Box::new(tool));
        self
    }

    /// Cap on simultaneously executing tool calls within one turn.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call, folding every failure into response text so the
    /// model can react to it.
    async fn run_call(
        &self,
        call: &ToolCall,
        context: &HashMap<String, serde_json::Value>,
    ) -> (String, bool) {
        let name = &call.function.name;
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = %name, "model requested an unregistered tool");
            return (format!("error: tool '{name}' is not available"), false);
        };

        let arguments = match call.parsed_arguments() {
            Ok(arguments) => arguments,
            Err(source) => {
                let error = ToolError::MalformedArguments {
                    name: name.clone(),
                    source,
                };
                tracing::warn!(tool = %name, %error, "tool arguments failed to parse");
                return (format!("error: {error}"), false);
            }
        };

        let span = info_span!(
            "execute_tool",
            "gen_ai.operation.name" = "execute_tool",
            "gen_ai.tool.name" = %name,
            "gen_ai.tool.call.id" = %call.id,
        );
        let output = tool
            .call(arguments, context.clone())
            .instrument(span)
            .await
            .unwrap_or_else(|error| format!("error: {error}"));

        (output, tool.return_direct())
    }
}

impl ToolExecutor for ToolSet {
    fn resolve_tool_definitions(
        &self,
        options: &ChatOptions,
    ) -> Result<Vec<ToolDefinition>, ToolError> {
        if options.tool_names.is_empty() {
            let mut definitions: Vec<_> =
                self.tools.values().map(|tool| tool.definition()).collect();
            definitions.sort_by(|a, b| a.name.cmp(&b.name));
            return Ok(definitions);
        }

        options
            .tool_names
            .iter()
            .map(|name| {
                self.tools
                    .get(name)
                    .map(|tool| tool.definition())
                    .ok_or_else(|| ToolError::NotFoundError(name.clone()))
            })
            .collect()
    }

    async fn execute_tool_calls(
        &self,
        conversation: &[Message],
        response: &ChatResponse,
        options: &ChatOptions,
    ) -> Result<ToolExecutionResult, ToolError> {
        let calls: Vec<&ToolCall> = response.tool_calls().collect();

        // `buffered` keeps results in call order, so tool responses line up
        // with the calls that produced them.
        let futures: Vec<_> = calls
            .iter()
            .map(|call| self.run_call(call, &options.tool_context))
            .collect();
        let outcomes: Vec<(String, bool)> = futures::stream::iter(futures)
            .buffered(self.concurrency)
            .collect()
            .await;

        let all_return_direct =
            !outcomes.is_empty() && outcomes.iter().all(|(_, direct)| *direct);
        if all_return_direct {
            let generations = outcomes
                .into_iter()
                .map(|(output, _)| Generation::from_text(output, FINISH_REASON_RETURN_DIRECT))
                .collect();
            return Ok(ToolExecutionResult::ReturnDirect(generations));
        }

        let mut extended = conversation.to_vec();
        extended.push(Message::Assistant {
            content: response.text().to_string(),
            media: Vec::new(),
            tool_calls: calls.iter().map(|call| (*call).clone()).collect(),
        });
        for (call, (output, _)) in calls.iter().zip(outcomes) {
            extended.push(Message::tool_response(
                call.id.clone(),
                call.function.name.clone(),
                output,
            ));
        }
        Ok(ToolExecutionResult::Continue(extended))
    }
}
