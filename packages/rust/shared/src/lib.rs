//! Shared types, error model, and configuration for kbchat.
//!
//! This crate is the foundation depended on by all other kbchat crates.
//! It provides:
//! - [`KbChatError`], the unified error type
//! - The result model ([`SearchResult`], [`MatchType`], [`ChunkType`], [`ImageInfo`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_CONTEXT_TEMPLATE, MAX_SOURCES, ModelConfig, PipelineConfig, SourceConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{KbChatError, Result};
pub use types::{ChunkType, ImageInfo, MatchType, SearchResult};
