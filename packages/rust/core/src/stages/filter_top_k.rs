//! `filter_top_k`: keep the best `top_k` fused results.

use async_trait::async_trait;
use tracing::info;

use kbchat_retrieval::truncate_top_k;

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::plugin::{ChainResult, Next, Plugin};

/// Truncates [`ChatManage::merge_result`] to [`ChatManage::top_k`] entries.
/// A `top_k` of zero keeps everything.
pub struct FilterTopKStage;

impl FilterTopKStage {
    pub const NAME: &'static str = "filter_top_k";
}

#[async_trait]
impl Plugin for FilterTopKStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn activation_events(&self) -> Vec<EventType> {
        vec![EventType::FilterTopK]
    }

    async fn on_event(
        &self,
        ctx: &RequestContext,
        _event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult {
        let before = chat.merge_result.len();
        truncate_top_k(&mut chat.merge_result, chat.top_k);
        info!(
            session_id = %chat.session_id,
            top_k = chat.top_k,
            before,
            after = chat.merge_result.len(),
            "filter output"
        );
        next.run(ctx, chat).await
    }
}
