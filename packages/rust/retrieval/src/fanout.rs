//! Concurrent multi-source retrieval.
//!
//! One task is spawned per target source. Every task records its outcome in a
//! shared map behind a single mutex; the fan-in waits for all of them and then
//! re-linearizes the outcomes in the caller's source order so fusion never
//! depends on arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use kbchat_shared::{KbChatError, MAX_SOURCES, Result, SearchResult};

use crate::source::{KnowledgeSearch, SearchParams};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// An advisory failure scoped to a single source.
#[derive(Debug)]
pub struct SourceError {
    pub source_id: String,
    pub error: KbChatError,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source_id, self.error)
    }
}

/// Raw per-source outcomes, both lists in caller order.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    /// Sources that answered, with their results in source order.
    pub per_source: Vec<(String, Vec<SearchResult>)>,
    /// Sources that failed, were not configured, or were cancelled.
    pub errors: Vec<SourceError>,
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// Issues one search per target source concurrently and fans the outcomes in.
#[derive(Clone)]
pub struct FanOut {
    searcher: Arc<dyn KnowledgeSearch>,
    max_sources: usize,
}

impl FanOut {
    pub fn new(searcher: Arc<dyn KnowledgeSearch>) -> Self {
        Self {
            searcher,
            max_sources: MAX_SOURCES,
        }
    }

    /// Lower the per-query source bound. Never exceeds [`MAX_SOURCES`].
    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources.clamp(1, MAX_SOURCES);
        self
    }

    /// Check the query and the source list before any search is issued.
    pub fn validate(&self, query: &str, source_ids: &[String]) -> Result<()> {
        if source_ids.is_empty() {
            return Err(KbChatError::invalid_argument(
                "at least one knowledge source id is required",
            ));
        }
        if source_ids.len() > self.max_sources {
            return Err(KbChatError::invalid_argument(format!(
                "too many knowledge sources: {} (maximum {})",
                source_ids.len(),
                self.max_sources
            )));
        }
        if query.trim().is_empty() {
            return Err(KbChatError::invalid_argument("query is required"));
        }
        Ok(())
    }

    /// Query every source concurrently and wait for all of them.
    ///
    /// Fails only on invalid input. Per-source failures and cancellations are
    /// returned as advisory entries in [`FanOutOutcome::errors`].
    #[instrument(skip_all, fields(searcher = %self.searcher.name(), sources = source_ids.len(), match_count = match_count))]
    pub async fn fan_out(
        &self,
        query: &str,
        source_ids: &[String],
        match_count: usize,
        cancel: &CancellationToken,
    ) -> Result<FanOutOutcome> {
        self.validate(query, source_ids)?;

        let targets = unique_in_order(source_ids);
        if targets.len() < source_ids.len() {
            debug!(
                requested = source_ids.len(),
                unique = targets.len(),
                "ignoring repeated source ids"
            );
        }

        let params = Arc::new(SearchParams::new(query, match_count));
        let collected: Arc<Mutex<HashMap<String, Result<Vec<SearchResult>>>>> =
            Arc::new(Mutex::new(HashMap::with_capacity(targets.len())));

        info!(sources = targets.len(), "starting retrieval fan-out");

        let mut handles = Vec::with_capacity(targets.len());
        for source_id in &targets {
            let searcher = Arc::clone(&self.searcher);
            let params = Arc::clone(&params);
            let collected = Arc::clone(&collected);
            let cancel = cancel.clone();
            let task_source_id = source_id.clone();

            handles.push((
                source_id.clone(),
                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(KbChatError::Cancelled),
                        result = searcher.search(&task_source_id, &params) => result,
                    };
                    collected.lock().await.insert(task_source_id, outcome);
                }),
            ));
        }

        // Fan-in barrier: every source, success or failure.
        for (source_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(source_id = %source_id, error = %e, "search task panicked");
                let error =
                    KbChatError::source_failure(&source_id, format!("search task failed: {e}"));
                collected.lock().await.insert(source_id, Err(error));
            }
        }

        let mut collected = collected.lock().await;
        let mut outcome = FanOutOutcome::default();
        for source_id in targets {
            match collected.remove(&source_id) {
                Some(Ok(results)) => {
                    debug!(source_id = %source_id, results = results.len(), "source answered");
                    outcome.per_source.push((source_id, results));
                }
                Some(Err(error)) => {
                    let error = classify(&source_id, error);
                    warn!(source_id = %source_id, error = %error, "source failed");
                    outcome.errors.push(SourceError { source_id, error });
                }
                None => outcome.errors.push(SourceError {
                    source_id,
                    error: KbChatError::Cancelled,
                }),
            }
        }

        info!(
            succeeded = outcome.per_source.len(),
            failed = outcome.errors.len(),
            "retrieval fan-out completed"
        );

        Ok(outcome)
    }
}

/// Keep per-source and cancellation errors as they are; anything else a
/// source produced is reported as that source's failure.
fn classify(source_id: &str, error: KbChatError) -> KbChatError {
    if error.is_per_source() || matches!(error, KbChatError::Cancelled) {
        error
    } else {
        KbChatError::source_failure(source_id, error.to_string())
    }
}

fn unique_in_order(ids: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    unique
}
