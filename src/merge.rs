//! Folding partial completion chunks into a running aggregate.
//!
//! The aggregate has the same shape as a chunk, so the fold is a plain
//! `Option`-valued merge with `None` as its identity:
//!
//! ```text
//! aggregate = chunks.fold(None, |acc, chunk| merge(acc, Some(chunk)))
//! ```
//!
//! The merge is total: it never errors, whatever fields a chunk omits.

use crate::api::{ChatCompletionChunk, ChunkChoice, Delta, ToolCallFragment};

/// Merge the next streamed chunk into the running aggregate. Either side may
/// be absent; `merge(x, None)` and `merge(None, x)` both yield `x`.
pub fn merge(
    previous: Option<ChatCompletionChunk>,
    current: Option<ChatCompletionChunk>,
) -> Option<ChatCompletionChunk> {
    match (previous, current) {
        (None, current) => current,
        (previous, None) => previous,
        (Some(previous), Some(current)) => Some(merge_chunks(previous, current)),
    }
}

fn merge_chunks(previous: ChatCompletionChunk, current: ChatCompletionChunk) -> ChatCompletionChunk {
    let previous_choice = previous.choices.into_iter().find(|choice| choice.index == 0);
    let current_choice = current.choices.into_iter().find(|choice| choice.index == 0);

    ChatCompletionChunk {
        id: current.id.or(previous.id),
        model: current.model.or(previous.model),
        created: current.created.or(previous.created),
        model_version: current.model_version.or(previous.model_version),
        choices: vec![merge_choice(previous_choice, current_choice)],
        usage: current.usage.or(previous.usage),
        warnings: current.warnings.or(previous.warnings),
    }
}

fn merge_choice(previous: Option<ChunkChoice>, current: Option<ChunkChoice>) -> ChunkChoice {
    let previous = previous.unwrap_or_default();
    let current = current.unwrap_or_default();

    ChunkChoice {
        index: 0,
        delta: Delta {
            role: current.delta.role.or(previous.delta.role),
            // The aggregate always carries content, even if no chunk did.
            content: Some(
                current
                    .delta
                    .content
                    .or(previous.delta.content)
                    .unwrap_or_default(),
            ),
            refusal: current.delta.refusal.or(previous.delta.refusal),
            tool_calls: merge_tool_fragments(previous.delta.tool_calls, current.delta.tool_calls),
        },
        finish_reason: current.finish_reason.or(previous.finish_reason),
    }
}

/// Fold incoming tool-call fragments into the accumulated list.
///
/// A fragment carrying a non-empty id opens a new call; an id-less fragment
/// extends the most recently opened one by concatenating argument text and
/// filling in `name`/`type` if they arrive late. An id-less fragment with
/// nothing open is a malformed stream; it is recovered as a new call under a
/// synthesized id so its arguments are not lost.
fn merge_tool_fragments(
    mut accumulated: Vec<ToolCallFragment>,
    incoming: Vec<ToolCallFragment>,
) -> Vec<ToolCallFragment> {
    for fragment in incoming {
        if fragment.opens_call() {
            accumulated.push(ToolCallFragment {
                index: accumulated.len(),
                ..fragment
            });
        } else if let Some(open) = accumulated.last_mut() {
            if open.r#type.is_none() {
                open.r#type = fragment.r#type;
            }
            if open.function.name.is_none() {
                open.function.name = fragment.function.name;
            }
            open.function.arguments.push_str(&fragment.function.arguments);
        } else {
            let id = format!("call_{}", nanoid::nanoid!());
            tracing::warn!(
                synthesized_id = %id,
                "tool-call fragment arrived with no id and no open call; recovering"
            );
            accumulated.push(ToolCallFragment {
                index: 0,
                id: Some(id),
                ..fragment
            });
        }
    }
    accumulated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FunctionFragment;

    fn content_chunk(id: Option<&str>, content: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: id.map(String::from),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    content: content.map(String::from),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            ..Default::default()
        }
    }

    fn fragment_chunk(fragment: ToolCallFragment) -> ChatCompletionChunk {
        ChatCompletionChunk {
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    tool_calls: vec![fragment],
                    ..Default::default()
                },
                finish_reason: None,
            }],
            ..Default::default()
        }
    }

    fn opening_fragment(id: &str, name: &str) -> ToolCallFragment {
        ToolCallFragment {
            index: 0,
            id: Some(id.into()),
            r#type: Some("function".into()),
            function: FunctionFragment {
                name: Some(name.into()),
                arguments: String::new(),
            },
        }
    }

    fn continuation_fragment(arguments: &str) -> ToolCallFragment {
        ToolCallFragment {
            index: 0,
            id: None,
            r#type: None,
            function: FunctionFragment {
                name: None,
                arguments: arguments.into(),
            },
        }
    }

    #[test]
    fn test_merge_identity() {
        let chunk = content_chunk(Some("chatcmpl-1"), Some("hi"));
        assert_eq!(merge(None, Some(chunk.clone())).unwrap().id, chunk.id);
        assert_eq!(merge(Some(chunk.clone()), None).unwrap().id, chunk.id);
        assert!(merge(None, None).is_none());
    }

    #[test]
    fn test_merge_newest_non_null_scalars() {
        let first = content_chunk(Some("chatcmpl-1"), Some("a"));
        let mut second = content_chunk(None, Some("b"));
        second.model = Some("granite-4".into());

        let merged = merge(Some(first), Some(second)).unwrap();
        // id survives from the first chunk, model arrives in the second.
        assert_eq!(merged.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(merged.model.as_deref(), Some("granite-4"));
    }

    #[test]
    fn test_merge_content_replaces_with_fallback() {
        let merged = merge(
            Some(content_chunk(None, Some("old"))),
            Some(content_chunk(None, None)),
        )
        .unwrap();
        assert_eq!(
            merged.first_choice().unwrap().delta.content.as_deref(),
            Some("old")
        );

        // Both sides empty: the aggregate still carries content.
        let merged = merge(
            Some(content_chunk(None, None)),
            Some(content_chunk(None, None)),
        )
        .unwrap();
        assert_eq!(
            merged.first_choice().unwrap().delta.content.as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_merge_usage_monotonic_replace() {
        let mut first = content_chunk(None, Some("a"));
        first.usage = Some(crate::api::Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        let second = content_chunk(None, Some("b"));

        // A chunk without usage must not clobber the last reported usage.
        let merged = merge(Some(first), Some(second)).unwrap();
        assert_eq!(merged.usage.unwrap().total_tokens, 2);
    }

    #[test]
    fn test_fragment_fold_concatenates_arguments() {
        let chunks = [
            fragment_chunk(opening_fragment("call_1", "get_weather")),
            fragment_chunk(continuation_fragment("{\"loc")),
            fragment_chunk(continuation_fragment("ation\":\"NYC\"}")),
        ];
        let aggregate = chunks
            .into_iter()
            .fold(None, |acc, chunk| merge(acc, Some(chunk)))
            .unwrap();

        let calls = &aggregate.first_choice().unwrap().delta.tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.name.as_deref(), Some("get_weather"));
        assert_eq!(calls[0].function.arguments, "{\"location\":\"NYC\"}");
    }

    #[test]
    fn test_fresh_id_opens_new_call() {
        let chunks = [
            fragment_chunk(opening_fragment("call_1", "get_weather")),
            fragment_chunk(continuation_fragment("{}")),
            fragment_chunk(opening_fragment("call_2", "get_time")),
            fragment_chunk(continuation_fragment("{\"tz\":\"UTC\"}")),
        ];
        let aggregate = chunks
            .into_iter()
            .fold(None, |acc, chunk| merge(acc, Some(chunk)))
            .unwrap();

        let calls = &aggregate.first_choice().unwrap().delta.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[1].id.as_deref(), Some("call_2"));
        assert_eq!(calls[1].function.arguments, "{\"tz\":\"UTC\"}");
    }

    #[test]
    fn test_late_name_fills_open_call() {
        let mut opener = opening_fragment("call_1", "x");
        opener.function.name = None;
        opener.r#type = None;
        let mut late = continuation_fragment("{}");
        late.function.name = Some("get_weather".into());
        late.r#type = Some("function".into());

        let aggregate = [fragment_chunk(opener), fragment_chunk(late)]
            .into_iter()
            .fold(None, |acc, chunk| merge(acc, Some(chunk)))
            .unwrap();

        let calls = &aggregate.first_choice().unwrap().delta.tool_calls;
        assert_eq!(calls[0].function.name.as_deref(), Some("get_weather"));
        assert_eq!(calls[0].r#type.as_deref(), Some("function"));
    }

    #[test]
    fn test_orphan_fragment_recovered_with_synthesized_id() {
        // The stream opens with an id-less fragment and nothing accumulated.
        let aggregate = merge(
            Some(content_chunk(None, None)),
            Some(fragment_chunk(continuation_fragment("{\"a\":1}"))),
        )
        .unwrap();

        let calls = &aggregate.first_choice().unwrap().delta.tool_calls;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.as_deref().unwrap().starts_with("call_"));
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    }

    #[test]
    fn test_merge_ignores_other_choice_indices() {
        let mut chunk = content_chunk(None, Some("main"));
        chunk.choices.push(ChunkChoice {
            index: 1,
            delta: Delta {
                content: Some("other".into()),
                ..Default::default()
            },
            finish_reason: None,
        });

        let merged = merge(Some(content_chunk(None, None)), Some(chunk)).unwrap();
        assert_eq!(merged.choices.len(), 1);
        assert_eq!(
            merged.first_choice().unwrap().delta.content.as_deref(),
            Some("main")
        );
    }

    #[test]
    fn test_finish_reason_survives() {
        let mut last = content_chunk(None, None);
        last.choices[0].finish_reason = Some("stop".into());

        let merged = merge(Some(content_chunk(None, Some("4"))), Some(last)).unwrap();
        assert_eq!(merged.finish_reason(), Some("stop"));

        // Later chunks without one do not erase it.
        let merged = merge(Some(merged), Some(content_chunk(None, None))).unwrap();
        assert_eq!(merged.finish_reason(), Some("stop"));
    }
}
