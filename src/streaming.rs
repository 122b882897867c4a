//! The caller-facing streaming surface.
//!
//! [`ChatStream`] wraps a backend chunk stream, folds every chunk through the
//! merger as it arrives, and re-emits the increments as [`ChatStreamEvent`]s
//! in arrival order. When the source ends (terminally or not), the aggregate
//! is finished into a [`ChatResponse`]: an early cut-off without a finish
//! reason still yields whatever content was accumulated.

use crate::api::ChatCompletionChunk;
use crate::completion::{ChatError, ChatResponse, ChunkStream};
use crate::generation::response_from_aggregate;
use crate::merge::merge;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One increment of a streamed response.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatStreamEvent {
    /// A piece of generated text.
    Content { delta: String },
    /// A piece of a tool call being streamed. `id` and `name` are present on
    /// the fragment that opens the call; later fragments carry argument text.
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
}

/// A streamed response being folded into its aggregate.
///
/// Poll it as a `Stream` of events; once it yields `None`, [`response`]
/// returns the completed (possibly partial) response.
///
/// [`response`]: ChatStream::response
pub struct ChatStream {
    inner: ChunkStream,
    aggregate: Option<ChatCompletionChunk>,
    /// Full concatenation of all content deltas. The aggregate itself only
    /// keeps the newest delta's content; callers want the whole text.
    text: String,
    pending: VecDeque<ChatStreamEvent>,
    finished: bool,
    response: Option<ChatResponse>,
}

impl ChatStream {
    pub fn new(inner: ChunkStream) -> Self {
        ChatStream {
            inner,
            aggregate: None,
            text: String::new(),
            pending: VecDeque::new(),
            finished: false,
            response: None,
        }
    }

    /// The finished response. `None` until the stream has yielded `None`.
    pub fn response(&self) -> Option<&ChatResponse> {
        self.response.as_ref()
    }

    /// Finish now and take the best-effort response, discarding any chunks
    /// still in flight. Used on cancellation.
    pub fn into_response(mut self) -> ChatResponse {
        if self.response.is_none() {
            self.finish();
        }
        self.response.take().unwrap_or_default()
    }

    fn absorb(&mut self, chunk: ChatCompletionChunk) {
        if let Some(choice) = chunk.first_choice() {
            if let Some(content) = &choice.delta.content
                && !content.is_empty()
            {
                self.text.push_str(content);
                self.pending.push_back(ChatStreamEvent::Content {
                    delta: content.clone(),
                });
            }
            for fragment in &choice.delta.tool_calls {
                self.pending.push_back(ChatStreamEvent::ToolCallDelta {
                    id: fragment.id.clone().filter(|id| !id.is_empty()),
                    name: fragment.function.name.clone(),
                    arguments: fragment.function.arguments.clone(),
                });
            }
        }
        self.aggregate = merge(self.aggregate.take(), Some(chunk));
    }

    fn finish(&mut self) {
        self.finished = true;
        let mut response = response_from_aggregate(self.aggregate.take());
        if let Some(generation) = response.generations.first_mut() {
            generation.text = std::mem::take(&mut self.text);
        }
        self.response = Some(response);
    }
}

impl Stream for ChatStream {
    type Item = Result<ChatStreamEvent, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(error))) => {
                    // A broken stream still finishes with what was gathered.
                    this.finish();
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(Some(Ok(chunk))) => this.absorb(chunk),
            }
        }
    }
}
