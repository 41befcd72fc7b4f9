//! The search capability and the registry of configured knowledge sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbchat_shared::{Result, SearchResult, SourceConfig};

/// Parameters for one retrieval call against one knowledge source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text query.
    pub query_text: String,
    /// Maximum number of results the source should return.
    pub match_count: usize,
}

impl SearchParams {
    pub fn new(query_text: impl Into<String>, match_count: usize) -> Self {
        Self {
            query_text: query_text.into(),
            match_count,
        }
    }
}

/// Search capability consumed by the fan-out.
///
/// Implementations decide how relevance is computed (vector, keyword, graph or
/// hybrid). They must return a source-local result order and must not assume
/// anything about the score scale of other sources.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    /// Query one knowledge source.
    ///
    /// A source that lacks the setup needed to answer should fail with
    /// [`KbChatError::ConfigurationMissing`](kbchat_shared::KbChatError::ConfigurationMissing).
    async fn search(&self, source_id: &str, params: &SearchParams) -> Result<Vec<SearchResult>>;

    /// Human-readable implementation name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registered knowledge source.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSource {
    pub id: String,
    pub endpoint: String,
    pub title: Option<String>,
}

impl RegisteredSource {
    /// Title if one was configured, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Holds configured knowledge sources in configuration order.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `[[sources]]` config entries. Later duplicates of an
    /// id replace the endpoint of the earlier entry but keep its position.
    pub fn from_config(entries: &[SourceConfig]) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(&entry.id, &entry.endpoint, entry.title.clone());
        }
        registry
    }

    /// Register (or update) a source.
    pub fn register(&mut self, id: &str, endpoint: &str, title: Option<String>) {
        let source = RegisteredSource {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            title,
        };
        match self.sources.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    /// Look up a source by id.
    pub fn get(&self, id: &str) -> Option<&RegisteredSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// All configured ids in configuration order.
    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// The subset of `requested` ids that are configured, in the caller's order.
    pub fn configured<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|id| self.get(id).is_some())
            .map(String::as_str)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
