//! Request options and the layering of runtime options over defaults.
//!
//! An engine carries default options; each exchange may supply runtime
//! options. [`reconcile`] layers the two into the effective options for the
//! exchange: scalars are runtime-wins, collections are unioned so that
//! engine-level and exchange-level tool registrations both apply.

use crate::completion::ChatError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Options applied to a chat-completion request. Every scalar is optional;
/// `None` means "let the lower layer (or the service) decide".
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    /// Server-side time limit for the request, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Whether the engine executes requested tool calls itself. `None`
    /// defaults to `true`; set to `false` to have tool calls surfaced to the
    /// caller unexecuted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_tool_execution: Option<bool>,
    /// Requested output-audio format; determines the MIME type attached to
    /// decoded audio payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<AudioFormat>,
    /// Names of registered tools this request may call.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tool_names: BTreeSet<String>,
    /// Opaque per-tool context made available to tool executions.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tool_context: HashMap<String, serde_json::Value>,
    /// Extra provider parameters merged verbatim into the wire request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_params: Option<serde_json::Value>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tool_names.insert(name.into());
        self
    }

    pub fn internal_tool_execution(mut self, enabled: bool) -> Self {
        self.internal_tool_execution = Some(enabled);
        self
    }

    pub fn additional_params(mut self, params: serde_json::Value) -> Self {
        self.additional_params = Some(params);
        self
    }
}

/// Output-audio formats the service can produce.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// Layer `runtime` options over `defaults` into the effective options for one
/// exchange, then validate interdependent fields. Scalars: runtime non-null
/// wins. `tool_names` and `tool_context` are unioned (runtime wins per key);
/// `additional_params` are object-merged.
pub fn reconcile(runtime: ChatOptions, defaults: &ChatOptions) -> Result<ChatOptions, ChatError> {
    let mut tool_names = defaults.tool_names.clone();
    tool_names.extend(runtime.tool_names);

    let mut tool_context = defaults.tool_context.clone();
    tool_context.extend(runtime.tool_context);

    let additional_params = match (defaults.additional_params.clone(), runtime.additional_params) {
        (Some(default_params), Some(runtime_params)) => {
            Some(crate::json_utils::merge(default_params, runtime_params))
        }
        (default_params, runtime_params) => runtime_params.or(default_params),
    };

    let effective = ChatOptions {
        model: runtime.model.or_else(|| defaults.model.clone()),
        temperature: runtime.temperature.or(defaults.temperature),
        top_p: runtime.top_p.or(defaults.top_p),
        max_tokens: runtime.max_tokens.or(defaults.max_tokens),
        n: runtime.n.or(defaults.n),
        seed: runtime.seed.or(defaults.seed),
        stop: runtime.stop.or_else(|| defaults.stop.clone()),
        logprobs: runtime.logprobs.or(defaults.logprobs),
        top_logprobs: runtime.top_logprobs.or(defaults.top_logprobs),
        time_limit: runtime.time_limit.or(defaults.time_limit),
        internal_tool_execution: runtime
            .internal_tool_execution
            .or(defaults.internal_tool_execution),
        audio_format: runtime.audio_format.or(defaults.audio_format),
        tool_names,
        tool_context,
        additional_params,
    };

    validate(&effective)?;
    Ok(effective)
}

fn validate(options: &ChatOptions) -> Result<(), ChatError> {
    if options.top_logprobs.is_some() && options.logprobs != Some(true) {
        return Err(ChatError::InvalidOptions(
            "top_logprobs requires logprobs to be enabled".into(),
        ));
    }
    if options.time_limit == Some(0) {
        return Err(ChatError::InvalidOptions(
            "time_limit must be strictly positive".into(),
        ));
    }
    if options.n == Some(0) {
        return Err(ChatError::InvalidOptions("n must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_scalar_wins() {
        let defaults = ChatOptions::new().model("granite-3").temperature(0.2);
        let runtime = ChatOptions::new().temperature(0.9);

        let effective = reconcile(runtime, &defaults).unwrap();
        assert_eq!(effective.model.as_deref(), Some("granite-3"));
        assert_eq!(effective.temperature, Some(0.9));
    }

    #[test]
    fn test_tool_names_union() {
        let defaults = ChatOptions::new().tool("b");
        let runtime = ChatOptions::new().tool("a");

        let effective = reconcile(runtime, &defaults).unwrap();
        assert_eq!(
            effective.tool_names.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_tool_context_union_runtime_wins_per_key() {
        let mut defaults = ChatOptions::new();
        defaults
            .tool_context
            .insert("region".into(), serde_json::json!("us-east"));
        defaults
            .tool_context
            .insert("retries".into(), serde_json::json!(3));

        let mut runtime = ChatOptions::new();
        runtime
            .tool_context
            .insert("region".into(), serde_json::json!("eu-west"));

        let effective = reconcile(runtime, &defaults).unwrap();
        assert_eq!(effective.tool_context["region"], "eu-west");
        assert_eq!(effective.tool_context["retries"], 3);
    }

    #[test]
    fn test_additional_params_merged() {
        let defaults =
            ChatOptions::new().additional_params(serde_json::json!({"a": 1, "b": 1}));
        let runtime = ChatOptions::new().additional_params(serde_json::json!({"b": 2}));

        let effective = reconcile(runtime, &defaults).unwrap();
        assert_eq!(
            effective.additional_params.unwrap(),
            serde_json::json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn test_top_logprobs_requires_logprobs() {
        let mut runtime = ChatOptions::new();
        runtime.top_logprobs = Some(5);
        assert!(matches!(
            reconcile(runtime.clone(), &ChatOptions::new()),
            Err(ChatError::InvalidOptions(_))
        ));

        runtime.logprobs = Some(true);
        assert!(reconcile(runtime, &ChatOptions::new()).is_ok());
    }

    #[test]
    fn test_zero_time_limit_rejected() {
        let mut runtime = ChatOptions::new();
        runtime.time_limit = Some(0);
        assert!(matches!(
            reconcile(runtime, &ChatOptions::new()),
            Err(ChatError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_zero_n_rejected() {
        let mut runtime = ChatOptions::new();
        runtime.n = Some(0);
        assert!(matches!(
            reconcile(runtime, &ChatOptions::new()),
            Err(ChatError::InvalidOptions(_))
        ));
    }
}
