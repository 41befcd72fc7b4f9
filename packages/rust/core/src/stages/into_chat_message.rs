//! `into_chat_message`: render the prompt from the fused results.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use kbchat_context::{RenderOptions, assemble, sanitize_for_log};

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{ChainResult, Next, Plugin, PluginError, PluginErrorKind};

/// Validates the query and writes the rendered template to
/// [`ChatManage::user_content`].
///
/// An unsafe query aborts the chain with
/// [`PluginErrorKind::TemplateExecute`] before anything is written.
pub struct IntoChatMessageStage;

impl IntoChatMessageStage {
    pub const NAME: &'static str = "into_chat_message";
}

#[async_trait]
impl Plugin for IntoChatMessageStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::IntoChatMessage]
    }

    #[instrument(skip_all, fields(session_id = %chat.session_id, results = chat.merge_result.len()))]
    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        let opts = RenderOptions {
            faq_priority_enabled: chat.faq_priority_enabled,
            faq_direct_answer_threshold: chat.faq_direct_answer_threshold,
        };

        let assembled = assemble(
            &chat.query,
            &chat.merge_result,
            &chat.summary_config.context_template,
            opts,
            &chrono::Local::now(),
        )
        .map_err(|e| {
            warn!(query = %sanitize_for_log(&chat.query), error = %e, "query rejected");
            PluginError::new(PluginErrorKind::TemplateExecute, Self::NAME, e)
        })?;

        info!(
            user_content_len = assembled.user_content.len(),
            faq_sections = assembled.faq_sections,
            high_confidence_faq = assembled.high_confidence_faq,
            "prompt assembled"
        );

        chat.user_content = assembled.user_content;
        next.run(ctx, chat).await
    }
}
