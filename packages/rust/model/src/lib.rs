//! Chat-model capability used by the answer pipeline.
//!
//! The pipeline needs text in, text out, plus an optional tool-call surface.
//! [`ChatModel`] is that seam; [`OpenAiCompatChat`] implements it for any
//! OpenAI-compatible endpoint.

mod openai;
mod sse;
mod types;

use async_trait::async_trait;
use futures::stream::BoxStream;

use kbchat_shared::Result;

pub use openai::OpenAiCompatChat;
pub use sse::sse_events;
pub use types::{ChatOptions, ChatResponse, Message, Role, StreamEvent, ToolCall};

/// A chat model. Model selection and provider routing live behind it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a conversation in one call.
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> Result<ChatResponse>;

    /// Complete a conversation as a stream of events ending in exactly one
    /// [`StreamEvent::Done`] or [`StreamEvent::Error`].
    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<BoxStream<'static, StreamEvent>>;

    /// Model identifier for tracing.
    fn model_name(&self) -> &str;
}
