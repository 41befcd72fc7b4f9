//! Named pipeline events that stages activate on.

use std::fmt;

/// A pipeline phase. Stages register for one or more of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// Fan out the query to every target knowledge source.
    ChunkSearch,
    /// Fuse per-source results into one ranked list.
    ChunkMerge,
    /// Keep only the top-k fused results.
    FilterTopK,
    /// Assemble the prompt from the fused results.
    IntoChatMessage,
    /// Ask the chat model for a complete answer.
    ChatCompletion,
    /// Ask the chat model for a streamed answer.
    ChatCompletionStream,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChunkSearch => "chunk_search",
            Self::ChunkMerge => "chunk_merge",
            Self::FilterTopK => "filter_top_k",
            Self::IntoChatMessage => "into_chat_message",
            Self::ChatCompletion => "chat_completion",
            Self::ChatCompletionStream => "chat_completion_stream",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
