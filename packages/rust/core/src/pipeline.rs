//! End-to-end answer pipeline: search → merge → top-k → prompt → model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use kbchat_model::ChatModel;
use kbchat_retrieval::{FanOut, KnowledgeSearch};

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;
use crate::manager::EventManager;
use crate::plugin::PluginError;
use crate::stages::{
    ChatCompletionStage, ChatCompletionStreamStage, FilterTopKStage, IntoChatMessageStage,
    MergeStage, SearchStage,
};

/// Which events a request runs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Retrieve, assemble, and answer in one response.
    Rag,
    /// Retrieve, assemble, and stream the answer.
    RagStream,
    /// Retrieve and assemble the prompt without calling the model.
    ContextOnly,
}

impl PipelineKind {
    pub fn events(&self) -> &'static [EventType] {
        match self {
            Self::Rag => &RAG_EVENTS,
            Self::RagStream => &RAG_STREAM_EVENTS,
            Self::ContextOnly => &RAG_EVENTS[..4],
        }
    }
}

static RAG_EVENTS: [EventType; 5] = [
    EventType::ChunkSearch,
    EventType::ChunkMerge,
    EventType::FilterTopK,
    EventType::IntoChatMessage,
    EventType::ChatCompletion,
];

static RAG_STREAM_EVENTS: [EventType; 5] = [
    EventType::ChunkSearch,
    EventType::ChunkMerge,
    EventType::FilterTopK,
    EventType::IntoChatMessage,
    EventType::ChatCompletionStream,
];

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub events: usize,
    pub results: usize,
    pub failed_sources: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before an event's chain runs.
    fn stage(&self, event: EventType);
    /// Called when the pipeline completes.
    fn done(&self, summary: &PipelineSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _event: EventType) {}
    fn done(&self, _summary: &PipelineSummary) {}
}

/// Register the built-in stages.
///
/// Every event of every [`PipelineKind`] gets exactly one stage.
pub fn default_event_manager(
    searcher: Arc<dyn KnowledgeSearch>,
    max_sources: usize,
    model: Arc<dyn ChatModel>,
) -> EventManager {
    let fan_out = FanOut::new(searcher).with_max_sources(max_sources);
    EventManager::new()
        .with(Arc::new(SearchStage::new(fan_out)))
        .with(Arc::new(MergeStage))
        .with(Arc::new(FilterTopKStage))
        .with(Arc::new(IntoChatMessageStage))
        .with(Arc::new(ChatCompletionStage::new(Arc::clone(&model))))
        .with(Arc::new(ChatCompletionStreamStage::new(model)))
}

/// Trigger each event of `kind` in order, stopping at the first abort.
#[instrument(skip_all, fields(kind = ?kind, session_id = %chat.session_id, request_id = %ctx.request_id))]
pub async fn run_pipeline(
    manager: &EventManager,
    kind: PipelineKind,
    ctx: &RequestContext,
    chat: &mut ChatManage,
    progress: &dyn ProgressReporter,
) -> Result<PipelineSummary, PluginError> {
    let start = Instant::now();
    let events = kind.events();

    for &event in events {
        progress.stage(event);
        manager.trigger(ctx, event, chat).await?;
    }

    let summary = PipelineSummary {
        events: events.len(),
        results: chat.merge_result.len(),
        failed_sources: chat.source_errors.len(),
        elapsed: start.elapsed(),
    };
    progress.done(&summary);

    info!(
        results = summary.results,
        failed_sources = summary.failed_sources,
        elapsed_ms = summary.elapsed.as_millis(),
        "pipeline complete"
    );
    Ok(summary)
}
