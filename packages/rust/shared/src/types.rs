//! Core domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MatchType / ChunkType
// ---------------------------------------------------------------------------

/// How a result was found by its knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Embedding,
    Keywords,
    NearbyChunk,
    History,
    ParentChunk,
    RelationChunk,
    Graph,
    WebSearch,
}

impl MatchType {
    /// Human-readable label used in retrieval reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Embedding => "Vector Match",
            Self::Keywords => "Keyword Match",
            Self::NearbyChunk => "Nearby Chunk Match",
            Self::History => "History Match",
            Self::ParentChunk => "Parent Chunk Match",
            Self::RelationChunk => "Relation Chunk Match",
            Self::Graph => "Graph Match",
            Self::WebSearch => "Web Search Match",
        }
    }
}

/// Structural kind of a retrieved chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    #[default]
    Text,
    ImageOcr,
    ImageCaption,
    Summary,
    Entity,
    Relationship,
    Faq,
    WebSearch,
    TableSummary,
    TableColumn,
    /// Any kind this build does not know about; rendered like text.
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// ImageInfo
// ---------------------------------------------------------------------------

/// Descriptor of an image attached to a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Stored image URL.
    #[serde(default)]
    pub url: String,
    /// URL of the image in the original document.
    #[serde(default)]
    pub original_url: String,
    /// Start offset of the image reference in the source text.
    #[serde(default)]
    pub start_pos: usize,
    /// End offset of the image reference in the source text.
    #[serde(default)]
    pub end_pos: usize,
    /// Model-generated caption.
    #[serde(default)]
    pub caption: String,
    /// Text recognised inside the image.
    #[serde(default)]
    pub ocr_text: String,
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// One retrieved unit, the common shape every knowledge source returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Dedup identity. Equal ids from different sources are the same result.
    pub id: String,
    /// Text payload; may embed markdown image references.
    #[serde(default)]
    pub content: String,
    /// Serialized JSON list of [`ImageInfo`] descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<String>,
    /// Relevance, larger is better. Not normalised across sources.
    pub score: f64,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub chunk_type: ChunkType,
    /// Origin document identity.
    #[serde(default)]
    pub knowledge_id: String,
    #[serde(default)]
    pub knowledge_title: String,
    /// Position of the chunk inside its origin document.
    #[serde(default)]
    pub chunk_index: usize,
}

impl SearchResult {
    /// Whether this result is an FAQ entry.
    pub fn is_faq(&self) -> bool {
        self.chunk_type == ChunkType::Faq
    }

    /// Parse the attached image descriptors, if any.
    pub fn image_infos(&self) -> serde_json::Result<Vec<ImageInfo>> {
        match self.image_info.as_deref() {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw),
        }
    }
}
