//! Error types for kbchat.
//!
//! Library crates use [`KbChatError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all kbchat operations.
#[derive(Debug, thiserror::Error)]
pub enum KbChatError {
    /// Malformed or missing required input (empty query, bad source list).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A targeted knowledge source lacks the setup needed to serve a query.
    #[error("source {source_id} is not configured: {message}")]
    ConfigurationMissing { source_id: String, message: String },

    /// A per-source retrieval call failed.
    #[error("source {source_id} failed: {message}")]
    SourceFailure { source_id: String, message: String },

    /// The query failed input-safety validation before templating.
    #[error("template execute error: {message}")]
    TemplateExecute { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a search endpoint or model.
    #[error("network error: {0}")]
    Network(String),

    /// Chat-model call error (API, decoding, or stream failure).
    #[error("model error: {0}")]
    Model(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The request was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbChatError>;

impl KbChatError {
    /// Create an invalid-argument error from any displayable message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    /// Create a configuration-missing error for a knowledge source.
    pub fn configuration_missing(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            source_id: source_id.into(),
            message: msg.into(),
        }
    }

    /// Create a source-failure error for a knowledge source.
    pub fn source_failure(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceFailure {
            source_id: source_id.into(),
            message: msg.into(),
        }
    }

    /// Create a template-execute error from any displayable message.
    pub fn template_execute(msg: impl Into<String>) -> Self {
        Self::TemplateExecute {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is scoped to a single knowledge source and therefore
    /// advisory rather than fatal to a pipeline run.
    pub fn is_per_source(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationMissing { .. } | Self::SourceFailure { .. }
        )
    }
}
