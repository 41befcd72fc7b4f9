//! The stage abstraction and its continuation.
//!
//! A stage receives a [`Next`] for the rest of its chain. To proceed it runs
//! the continuation and returns what the continuation returned; to abort it
//! returns a [`PluginError`] without running it. [`Next`] is consumed on use,
//! and the [`Proceeded`] marker a stage must return on success can only be
//! obtained from [`Next::run`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use kbchat_shared::KbChatError;

use crate::chat_manage::{ChatManage, RequestContext};
use crate::event::EventType;

// ---------------------------------------------------------------------------
// PluginError
// ---------------------------------------------------------------------------

/// Classification of a chain abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorKind {
    InvalidArgument,
    Search,
    TemplateExecute,
    ModelCall,
    Cancelled,
    Aborted,
}

impl PluginErrorKind {
    /// Default classification of a library error.
    pub fn classify(error: &KbChatError) -> Self {
        match error {
            KbChatError::InvalidArgument { .. } => Self::InvalidArgument,
            KbChatError::ConfigurationMissing { .. } | KbChatError::SourceFailure { .. } => {
                Self::Search
            }
            KbChatError::TemplateExecute { .. } => Self::TemplateExecute,
            KbChatError::Model(_) | KbChatError::Network(_) => Self::ModelCall,
            KbChatError::Cancelled => Self::Cancelled,
            KbChatError::Config { .. } | KbChatError::Io { .. } => Self::Aborted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::Search => "search failed",
            Self::TemplateExecute => "template execute failed",
            Self::ModelCall => "model call failed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PluginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal signal for a chain: stops every remaining stage and reaches the
/// caller of the event unchanged.
#[derive(Debug, thiserror::Error)]
#[error("stage {stage} {kind}: {source}")]
pub struct PluginError {
    pub kind: PluginErrorKind,
    /// Name of the stage that aborted.
    pub stage: String,
    /// Underlying cause.
    pub source: KbChatError,
}

impl PluginError {
    pub fn new(kind: PluginErrorKind, stage: impl Into<String>, source: KbChatError) -> Self {
        Self {
            kind,
            stage: stage.into(),
            source,
        }
    }

    /// Wrap `source`, classifying it with [`PluginErrorKind::classify`].
    pub fn from_error(stage: impl Into<String>, source: KbChatError) -> Self {
        Self::new(PluginErrorKind::classify(&source), stage, source)
    }

    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Cancelled, stage, KbChatError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Plugin / Next
// ---------------------------------------------------------------------------

/// Proof that a stage ran its continuation to completion.
#[derive(Debug)]
#[must_use]
pub struct Proceeded(());

/// Result of a stage or a continuation.
pub type ChainResult = Result<Proceeded, PluginError>;

/// A pipeline stage.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stage name, used in errors and tracing.
    fn name(&self) -> &str;

    /// Events this stage is registered for.
    fn activation_events(&self) -> Vec<EventType>;

    /// Handle `event`. Call `next.run(ctx, chat)` to proceed, or return an
    /// error to abort the chain.
    async fn on_event(
        &self,
        ctx: &RequestContext,
        event: EventType,
        chat: &mut ChatManage,
        next: Next<'_>,
    ) -> ChainResult;
}

/// The remainder of a chain.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Plugin>],
    event: EventType,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Plugin>], event: EventType) -> Self {
        Self {
            remaining: chain,
            event,
        }
    }

    /// Event being dispatched.
    pub fn event(&self) -> EventType {
        self.event
    }

    /// Number of stages still to run.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Run the rest of the chain. An empty remainder completes immediately.
    pub async fn run(self, ctx: &RequestContext, chat: &mut ChatManage) -> ChainResult {
        match self.remaining.split_first() {
            None => Ok(Proceeded(())),
            Some((stage, rest)) => {
                stage
                    .on_event(ctx, self.event, chat, Next::new(rest, self.event))
                    .await
            }
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("event", &self.event)
            .field("remaining", &self.remaining.len())
            .finish()
    }
}
