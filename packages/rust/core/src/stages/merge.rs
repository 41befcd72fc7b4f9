//! `chunk_merge`: fuse per-source results.

use async_trait::async_trait;
use tracing::info;

use kbchat_retrieval::fuse;

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{ChainResult, Next, Plugin};

/// Deduplicates and score-orders [`ChatManage::search_results`] into
/// [`ChatManage::merge_result`].
pub struct MergeStage;

impl MergeStage {
    pub const NAME: &'static str = "merge";
}

#[async_trait]
impl Plugin for MergeStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::ChunkMerge]
    }

    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        let input: usize = chat.search_results.iter().map(|(_, r)| r.len()).sum();
        chat.merge_result = fuse(chat.search_results.iter().map(|(_, r)| r.clone()));

        info!(
            session_id = %chat.session_id,
            input,
            output = chat.merge_result.len(),
            "merge output"
        );
        next.run(ctx, chat).await
    }
}
