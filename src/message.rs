//! The caller-facing conversation data model.
//!
//! A conversation is a `Vec<Message>`. Messages are tagged by role on the
//! wire; assistant messages may carry tool calls and media alongside (or
//! instead of) text, and tool responses correlate back to the call that
//! produced them via `id`.

use crate::json_utils;
use serde::{Deserialize, Serialize};

/// A single turn of a conversation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<Media>,
    },
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<Media>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    #[serde(rename = "tool")]
    ToolResponse {
        /// Correlation id of the tool call this responds to. Checked for
        /// presence when the request is built, not here.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
            media: Vec::new(),
        }
    }

    pub fn user_with_media(content: impl Into<String>, media: Vec<Media>) -> Self {
        Message::User {
            content: content.into(),
            media,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            media: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_response(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::ToolResponse {
            id: Some(id.into()),
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::user(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::user(text)
    }
}

/// A media item attached to a message: an image, audio clip or video,
/// identified by MIME type, carried inline or referenced by asset id.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Media {
    pub mime_type: String,
    pub data: MediaData,
}

impl Media {
    pub fn inline(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Media {
            mime_type: mime_type.into(),
            data: MediaData::Inline(bytes),
        }
    }

    pub fn asset(mime_type: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Media {
            mime_type: mime_type.into(),
            data: MediaData::Asset(asset_id.into()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MediaData {
    /// Raw bytes, base64-encoded on the wire.
    #[serde(with = "base64_bytes")]
    Inline(Vec<u8>),
    /// Reference to a previously uploaded or model-hosted asset.
    Asset(String),
}

mod base64_bytes {
    use base64::Engine;
    use base64::prelude::BASE64_STANDARD;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// A tool call requested by the model, as surfaced to the caller. Arguments
/// are kept as (normalized) text so malformed JSON can be reported per call
/// rather than poisoning the whole response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(default)]
    pub r#type: ToolType,
    pub function: ToolFunction,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            r#type: ToolType::Function,
            function: ToolFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the (already normalized) argument text as JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&json_utils::normalize_tool_arguments(
            &self.function.arguments,
        ))
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    #[default]
    Function,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}
