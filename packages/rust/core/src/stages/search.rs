//! `chunk_search`: fan the query out to every target source.

use async_trait::async_trait;
use tracing::{info, instrument};

use kbchat_context::sanitize_for_log;
use kbchat_retrieval::FanOut;

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{ChainResult, Next, Plugin, PluginError};

/// Runs the concurrent per-source search and records the raw outcomes.
///
/// Per-source failures are kept in [`ChatManage::source_errors`] and do not
/// stop the chain. Invalid input and cancellation do.
pub struct SearchStage {
    fan_out: FanOut,
}

impl SearchStage {
    pub const NAME: &'static str = "search";

    pub fn new(fan_out: FanOut) -> Self {
        Self { fan_out }
    }
}

#[async_trait]
impl Plugin for SearchStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::ChunkSearch]
    }

    #[instrument(skip_all, fields(session_id = %chat.session_id, sources = chat.knowledge_source_ids.len()))]
    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        info!(
            query = %sanitize_for_log(&chat.query),
            match_count = chat.match_count,
            "search input"
        );

        let outcome = self
            .fan_out
            .fan_out(
                &chat.query,
                &chat.knowledge_source_ids,
                chat.match_count,
                &ctx.cancel,
            )
            .await
            .map_err(|e| PluginError::from_error(Self::NAME, e))?;

        if ctx.is_cancelled() {
            return Err(PluginError::cancelled(Self::NAME));
        }

        info!(
            answered = outcome.per_source.len(),
            failed = outcome.errors.len(),
            results = outcome.per_source.iter().map(|(_, r)| r.len()).sum::<usize>(),
            "search output"
        );

        chat.search_results = outcome.per_source;
        chat.source_errors = outcome.errors;

        next.run(ctx, chat).await
    }
}
