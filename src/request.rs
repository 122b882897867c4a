//! Building the wire request for one submission attempt.
//!
//! Precondition checks happen here, before any network interaction: every
//! tool-response message must carry its correlation id, outbound media must
//! map to a supported MIME type, and option combinations the service cannot
//! honor (multi-choice streaming) are rejected.

use crate::completion::ChatError;
use crate::json_utils;
use crate::message::{Media, MediaData, Message, ToolCall};
use crate::options::ChatOptions;
use crate::tool::ToolDefinition;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Serialize;

/// A fully validated chat-completion request, ready for a backend to submit.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    pub stream: bool,
    #[serde(skip)]
    additional_params: Option<serde_json::Value>,
}

impl ChatRequest {
    /// Build a request from a conversation and reconciled options. Fails fast
    /// on precondition violations; nothing is sent yet.
    pub fn new(
        conversation: &[Message],
        options: &ChatOptions,
        tools: Vec<ToolDefinition>,
        stream: bool,
    ) -> Result<Self, ChatError> {
        if stream && options.n.unwrap_or(1) > 1 {
            return Err(ChatError::InvalidOptions(
                "multi-choice (n > 1) streaming is not supported".into(),
            ));
        }

        let messages = conversation
            .iter()
            .map(RequestMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ChatRequest {
            model: options.model.clone(),
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            n: options.n,
            seed: options.seed,
            stop: options.stop.clone(),
            logprobs: options.logprobs,
            top_logprobs: options.top_logprobs,
            time_limit: options.time_limit,
            tools: tools.into_iter().map(ToolSpec::function).collect(),
            stream,
            additional_params: options.additional_params.clone(),
        })
    }

    /// Serialize to the wire body, with any additional provider parameters
    /// merged on top.
    pub fn to_json(&self) -> Result<serde_json::Value, ChatError> {
        let mut body = serde_json::to_value(self)?;
        if let Some(params) = &self.additional_params {
            json_utils::merge_inplace(&mut body, params.clone());
        }
        Ok(body)
    }
}

/// A tool made available to the model, wrapped the way the wire expects.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ToolSpec {
    pub r#type: &'static str,
    pub function: ToolDefinition,
}

impl ToolSpec {
    fn function(definition: ToolDefinition) -> Self {
        ToolSpec {
            r#type: "function",
            function: definition,
        }
    }
}

/// One conversation message in wire form.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RequestMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<RequestContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TryFrom<&Message> for RequestMessage {
    type Error = ChatError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        match message {
            Message::System { content } => Ok(RequestMessage {
                role: "system",
                content: Some(RequestContent::Text(content.clone())),
                tool_calls: Vec::new(),
                tool_call_id: None,
                name: None,
            }),
            Message::User { content, media } => {
                let body = if media.is_empty() {
                    RequestContent::Text(content.clone())
                } else {
                    let mut parts = Vec::with_capacity(media.len() + 1);
                    if !content.is_empty() {
                        parts.push(ContentPart::Text {
                            text: content.clone(),
                        });
                    }
                    for item in media {
                        parts.push(media_part(item)?);
                    }
                    RequestContent::Parts(parts)
                };
                Ok(RequestMessage {
                    role: "user",
                    content: Some(body),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                    name: None,
                })
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => Ok(RequestMessage {
                role: "assistant",
                content: (!content.is_empty()).then(|| RequestContent::Text(content.clone())),
                tool_calls: tool_calls.clone(),
                tool_call_id: None,
                name: None,
            }),
            Message::ToolResponse { id, name, content } => {
                let id = id.clone().ok_or(ChatError::MissingToolCallId)?;
                Ok(RequestMessage {
                    role: "tool",
                    content: Some(RequestContent::Text(content.clone())),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(id),
                    name: name.clone(),
                })
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RequestContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: UrlPayload },
    AudioUrl { audio_url: UrlPayload },
    VideoUrl { video_url: UrlPayload },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UrlPayload {
    pub url: String,
}

/// Map an outbound media item onto a content part. Unmapped MIME types are a
/// precondition violation, never silently dropped content.
fn media_part(media: &Media) -> Result<ContentPart, ChatError> {
    let mime: mime::Mime = media
        .mime_type
        .parse()
        .map_err(|_| ChatError::UnsupportedMediaType(media.mime_type.clone()))?;

    let url = UrlPayload {
        url: match &media.data {
            MediaData::Inline(bytes) => format!(
                "data:{};base64,{}",
                media.mime_type,
                BASE64_STANDARD.encode(bytes)
            ),
            MediaData::Asset(asset_id) => asset_id.clone(),
        },
    };

    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("image", "png" | "jpeg" | "webp" | "gif") => Ok(ContentPart::ImageUrl { image_url: url }),
        ("audio", "wav" | "mpeg") => Ok(ContentPart::AudioUrl { audio_url: url }),
        ("video", "mp4") => Ok(ContentPart::VideoUrl { video_url: url }),
        _ => Err(ChatError::UnsupportedMediaType(media.mime_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_request_shape() {
        let conversation = vec![Message::system("Be brief."), Message::user("What's 2+2?")];
        let options = ChatOptions::new().model("granite-4").temperature(0.1);

        let request = ChatRequest::new(&conversation, &options, Vec::new(), false).unwrap();
        let body = request.to_json().unwrap();

        assert_eq!(body["model"], "granite-4");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What's 2+2?");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_response_requires_id() {
        let conversation = vec![Message::ToolResponse {
            id: None,
            name: Some("get_weather".into()),
            content: "sunny".into(),
        }];

        assert!(matches!(
            ChatRequest::new(&conversation, &ChatOptions::new(), Vec::new(), false),
            Err(ChatError::MissingToolCallId)
        ));
    }

    #[test]
    fn test_multi_choice_streaming_rejected() {
        let mut options = ChatOptions::new();
        options.n = Some(2);
        let conversation = vec![Message::user("hi")];

        assert!(matches!(
            ChatRequest::new(&conversation, &options, Vec::new(), true),
            Err(ChatError::InvalidOptions(_))
        ));
        // Non-streaming multi-choice is fine.
        assert!(ChatRequest::new(&conversation, &options, Vec::new(), false).is_ok());
    }

    #[test]
    fn test_inline_image_becomes_data_url() {
        let conversation = vec![Message::user_with_media(
            "what is this?",
            vec![Media::inline("image/png", vec![1, 2, 3])],
        )];

        let request =
            ChatRequest::new(&conversation, &ChatOptions::new(), Vec::new(), false).unwrap();
        let body = request.to_json().unwrap();
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_unsupported_media_type_fails_fast() {
        let conversation = vec![Message::user_with_media(
            "",
            vec![Media::asset("application/x-unknown", "asset-1")],
        )];

        assert!(matches!(
            ChatRequest::new(&conversation, &ChatOptions::new(), Vec::new(), false),
            Err(ChatError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_additional_params_merged_into_body() {
        let conversation = vec![Message::user("hi")];
        let options = ChatOptions::new()
            .additional_params(serde_json::json!({"project_id": "p-1", "stream": true}));

        let request = ChatRequest::new(&conversation, &options, Vec::new(), false).unwrap();
        let body = request.to_json().unwrap();
        assert_eq!(body["project_id"], "p-1");
        // Additional params apply last.
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_tools_wrapped_as_functions() {
        let tools = vec![ToolDefinition {
            name: "get_weather".into(),
            description: "Current weather for a location".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let conversation = vec![Message::user("weather in Boston?")];

        let request = ChatRequest::new(&conversation, &ChatOptions::new(), tools, false).unwrap();
        let body = request.to_json().unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
    }
}
