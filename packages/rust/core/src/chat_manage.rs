//! Per-request pipeline state.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use kbchat_model::{ChatOptions, ChatResponse, StreamEvent};
use kbchat_retrieval::SourceError;
use kbchat_shared::{AppConfig, PipelineConfig, SearchResult};

/// Identity and cancellation scope of one request.
///
/// Cancelling `cancel` abandons in-flight source searches and the model call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_cancel(CancellationToken::new())
    }

    /// Use a caller-owned token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Prompt settings applied by the assembly and completion stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryConfig {
    /// Template rendered with `{{query}}`, `{{contexts}}`, `{{current_time}}`
    /// and `{{current_week}}`.
    pub context_template: String,
    pub system_prompt: String,
    /// Answer used instead of the model when nothing was retrieved. Empty
    /// disables it.
    pub fallback_response: String,
}

/// Shared state of one pipeline run.
///
/// Created per request, owned by the caller for the duration of the run and
/// lent to each stage in turn. Stages never keep it past their invocation.
#[derive(Debug, Default)]
pub struct ChatManage {
    pub session_id: String,
    /// Raw user input.
    pub query: String,
    /// Target sources, in the order fusion iterates them.
    pub knowledge_source_ids: Vec<String>,
    /// Maximum results requested from each source.
    pub match_count: usize,
    /// Results kept after fusion. `0` keeps everything.
    pub top_k: usize,

    /// Per-source results in caller order, filled by the search stage.
    pub search_results: Vec<(String, Vec<SearchResult>)>,
    /// Advisory per-source failures, filled by the search stage.
    pub source_errors: Vec<SourceError>,
    /// Fused, ranked results. Empty (never absent) when nothing was found.
    pub merge_result: Vec<SearchResult>,

    pub faq_priority_enabled: bool,
    pub faq_direct_answer_threshold: f64,
    pub summary_config: SummaryConfig,
    pub chat_options: ChatOptions,

    /// Rendered prompt. Written once by the context assembly stage.
    pub user_content: String,
    /// Final answer, set by a completion stage.
    pub chat_response: Option<ChatResponse>,
    /// Receives streamed events when the streaming completion stage runs.
    pub stream_sink: Option<mpsc::Sender<StreamEvent>>,
}

impl ChatManage {
    /// Request state with the default `[pipeline]` limits and an empty
    /// template.
    pub fn new(
        session_id: impl Into<String>,
        query: impl Into<String>,
        knowledge_source_ids: Vec<String>,
    ) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            session_id: session_id.into(),
            query: query.into(),
            knowledge_source_ids,
            match_count: defaults.match_count,
            top_k: defaults.top_k,
            faq_direct_answer_threshold: defaults.faq_direct_answer_threshold,
            ..Default::default()
        }
    }

    /// Build request state with pipeline and model settings from config.
    pub fn from_config(
        config: &AppConfig,
        session_id: impl Into<String>,
        query: impl Into<String>,
        knowledge_source_ids: Vec<String>,
    ) -> Self {
        let pipeline = &config.pipeline;
        Self {
            match_count: pipeline.match_count,
            top_k: pipeline.top_k,
            faq_priority_enabled: pipeline.faq_priority_enabled,
            faq_direct_answer_threshold: pipeline.faq_direct_answer_threshold,
            summary_config: SummaryConfig {
                context_template: pipeline.context_template.clone(),
                system_prompt: pipeline.system_prompt.clone(),
                fallback_response: pipeline.fallback_response.clone(),
            },
            chat_options: ChatOptions::from(&config.model),
            ..Self::new(session_id, query, knowledge_source_ids)
        }
    }

    /// Attach a channel that receives streamed answer events.
    pub fn with_stream_sink(mut self, sink: mpsc::Sender<StreamEvent>) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    /// Answer text, if a completion stage produced one.
    pub fn answer(&self) -> Option<&str> {
        self.chat_response.as_ref().map(|r| r.content.as_str())
    }
}
