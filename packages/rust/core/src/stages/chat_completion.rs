//! `chat_completion` and `chat_completion_stream`: ask the chat model.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, instrument};

use kbchat_context::render_time_placeholders;
use kbchat_model::{ChatModel, ChatResponse, Message, StreamEvent};
use kbchat_shared::KbChatError;

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{ChainResult, Next, Plugin, PluginError, PluginErrorKind};

/// System prompt (time placeholders rendered) followed by the assembled
/// user content.
fn build_messages(chat: &ChatManage) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !chat.summary_config.system_prompt.is_empty() {
        messages.push(Message::system(render_time_placeholders(
            &chat.summary_config.system_prompt,
            &chrono::Local::now(),
        )));
    }
    messages.push(Message::user(chat.user_content.clone()));
    messages
}

/// The configured fallback answer, when nothing was retrieved.
fn fallback_answer(chat: &ChatManage) -> Option<String> {
    let fallback = &chat.summary_config.fallback_response;
    (chat.merge_result.is_empty() && !fallback.is_empty()).then(|| fallback.clone())
}

fn model_error(stage: &str, error: KbChatError) -> PluginError {
    PluginError::new(PluginErrorKind::ModelCall, stage, error)
}

// ---------------------------------------------------------------------------
// ChatCompletionStage
// ---------------------------------------------------------------------------

/// Requests one complete answer and stores it in [`ChatManage::chat_response`].
pub struct ChatCompletionStage {
    model: Arc<dyn ChatModel>,
}

impl ChatCompletionStage {
    pub const NAME: &'static str = "chat_completion";

    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Plugin for ChatCompletionStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::ChatCompletion]
    }

    #[instrument(skip_all, fields(session_id = %chat.session_id, model = %self.model.model_name()))]
    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        if let Some(answer) = fallback_answer(chat) {
            info!("nothing retrieved, using fallback response");
            chat.chat_response = Some(ChatResponse {
                content: answer,
                ..Default::default()
            });
            return next.run(ctx, chat).await;
        }

        let messages = build_messages(chat);
        let response = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(PluginError::cancelled(Self::NAME)),
            result = self.model.chat(&messages, &chat.chat_options) => {
                result.map_err(|e| model_error(Self::NAME, e))?
            }
        };

        info!(
            content_len = response.content.len(),
            tool_calls = response.tool_calls.len(),
            "completion output"
        );
        chat.chat_response = Some(response);
        next.run(ctx, chat).await
    }
}

// ---------------------------------------------------------------------------
// ChatCompletionStreamStage
// ---------------------------------------------------------------------------

/// Streams the answer into [`ChatManage::stream_sink`] while accumulating it
/// into [`ChatManage::chat_response`].
///
/// A stream error aborts the chain after the error event has been forwarded.
pub struct ChatCompletionStreamStage {
    model: Arc<dyn ChatModel>,
}

impl ChatCompletionStreamStage {
    pub const NAME: &'static str = "chat_completion_stream";

    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

async fn forward(chat: &ChatManage, event: &StreamEvent) {
    if let Some(sink) = &chat.stream_sink {
        if sink.send(event.clone()).await.is_err() {
            debug!("stream receiver dropped");
        }
    }
}

#[async_trait]
impl Plugin for ChatCompletionStreamStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::ChatCompletionStream]
    }

    #[instrument(skip_all, fields(session_id = %chat.session_id, model = %self.model.model_name()))]
    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        if let Some(answer) = fallback_answer(chat) {
            info!("nothing retrieved, streaming fallback response");
            forward(chat, &StreamEvent::Answer(answer.clone())).await;
            forward(chat, &StreamEvent::Done { tool_calls: vec![] }).await;
            chat.chat_response = Some(ChatResponse {
                content: answer,
                ..Default::default()
            });
            return next.run(ctx, chat).await;
        }

        let messages = build_messages(chat);
        let mut stream = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(PluginError::cancelled(Self::NAME)),
            result = self.model.chat_stream(&messages, &chat.chat_options) => {
                result.map_err(|e| model_error(Self::NAME, e))?
            }
        };

        let mut response = ChatResponse::default();
        let mut events = 0usize;
        loop {
            let event = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(PluginError::cancelled(Self::NAME)),
                event = stream.next() => event,
            };
            let Some(event) = event else {
                debug!("stream ended without a terminal event");
                break;
            };
            events += 1;
            forward(chat, &event).await;

            match event {
                StreamEvent::Answer(text) => response.content.push_str(&text),
                StreamEvent::ToolCall(call) => response.tool_calls.push(call),
                StreamEvent::Error(message) => {
                    return Err(model_error(Self::NAME, KbChatError::Model(message)));
                }
                StreamEvent::Done { tool_calls } => {
                    if !tool_calls.is_empty() {
                        response.tool_calls = tool_calls;
                    }
                    response.finish_reason = Some("stop".into());
                    break;
                }
            }
        }

        info!(
            events,
            content_len = response.content.len(),
            tool_calls = response.tool_calls.len(),
            "stream output"
        );
        chat.chat_response = Some(response);
        next.run(ctx, chat).await
    }
}
