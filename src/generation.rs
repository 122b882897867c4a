//! Projection of wire choices into the caller-facing [`Generation`].
//!
//! A generation is built either from a complete (non-streamed) choice or from
//! the drained aggregate of a streamed response. Tool-call argument text is
//! normalized here; the audio side channel is decoded and attached as media
//! rather than leaking base64 into text.

use crate::api::{ChatCompletion, ChatCompletionChunk, Choice, OutputAudio, Usage};
use crate::completion::{ChatError, ChatResponse};
use crate::json_utils;
use crate::message::{Media, ToolCall};
use crate::options::{AudioFormat, ChatOptions};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};

/// One generated completion choice as surfaced to the caller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Generation {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped; `""` when the service did not say.
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioMetadata>,
}

impl Generation {
    pub fn from_text(text: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Generation {
            text: text.into(),
            finish_reason: finish_reason.into(),
            ..Default::default()
        }
    }
}

/// Side-channel properties of a model-generated audio payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AudioMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Build a response from a complete, non-streamed completion.
pub fn response_from_completion(
    completion: ChatCompletion,
    options: &ChatOptions,
) -> Result<ChatResponse, ChatError> {
    let generations = completion
        .choices
        .into_iter()
        .map(|choice| generation_from_choice(choice, options))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChatResponse {
        generations,
        id: completion.id,
        model: completion.model,
        created: completion.created,
        model_version: completion.model_version,
        usage: completion.usage.unwrap_or_default(),
        warnings: completion.warnings.unwrap_or_default(),
    })
}

/// Build a response from the drained aggregate of a streamed response. The
/// aggregate may be partial (stream cancelled or ended early); whatever was
/// accumulated is surfaced as-is. Total: an empty aggregate yields an empty
/// response.
pub fn response_from_aggregate(aggregate: Option<ChatCompletionChunk>) -> ChatResponse {
    let Some(aggregate) = aggregate else {
        return ChatResponse::default();
    };

    let generation = match aggregate.choices.into_iter().find(|choice| choice.index == 0) {
        Some(choice) => {
            let tool_calls = choice
                .delta
                .tool_calls
                .into_iter()
                .filter_map(|fragment| {
                    let Some(id) = fragment.id else {
                        tracing::warn!("dropping accumulated tool call with no id");
                        return None;
                    };
                    Some(ToolCall::new(
                        id,
                        fragment.function.name.unwrap_or_default(),
                        json_utils::normalize_tool_arguments(&fragment.function.arguments),
                    ))
                })
                .collect();

            Generation {
                text: choice.delta.content.unwrap_or_default(),
                media: Vec::new(),
                tool_calls,
                finish_reason: choice.finish_reason.unwrap_or_default(),
                audio: None,
            }
        }
        None => Generation::default(),
    };

    ChatResponse {
        generations: vec![generation],
        id: aggregate.id,
        model: aggregate.model,
        created: aggregate.created,
        model_version: aggregate.model_version,
        usage: aggregate.usage.unwrap_or_default(),
        warnings: aggregate.warnings.unwrap_or_default(),
    }
}

/// Package return-direct tool output as a terminal response carrying the
/// usage accumulated so far.
pub fn response_from_generations(generations: Vec<Generation>, usage: Usage) -> ChatResponse {
    ChatResponse {
        generations,
        usage,
        ..Default::default()
    }
}

fn generation_from_choice(choice: Choice, options: &ChatOptions) -> Result<Generation, ChatError> {
    let message = choice.message;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            ToolCall::new(
                call.id,
                call.function.name,
                json_utils::normalize_tool_arguments(&call.function.arguments),
            )
        })
        .collect();

    let mut text = message.content.unwrap_or_default();
    let mut media = Vec::new();
    let mut audio_metadata = None;

    if let Some(audio) = message.audio {
        let OutputAudio {
            id,
            data,
            transcript,
            expires_at,
        } = audio;

        if let Some(encoded) = data {
            let bytes = BASE64_STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| ChatError::ResponseError(format!("invalid audio payload: {e}")))?;
            let format = options.audio_format.unwrap_or(AudioFormat::Wav);
            media.push(Media::inline(format.mime_type(), bytes));
        }
        if text.is_empty()
            && let Some(transcript) = transcript
        {
            text = transcript;
        }
        audio_metadata = Some(AudioMetadata { id, expires_at });
    }

    Ok(Generation {
        text,
        media,
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_default(),
        audio: audio_metadata,
    })
}
