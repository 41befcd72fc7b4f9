//! Pipeline orchestration for kbchat.
//!
//! A request is a [`ChatManage`] driven through a sequence of named events.
//! Each event runs the stages registered for it on an [`EventManager`] as a
//! continuation chain: a stage either proceeds by running its [`Next`] or
//! aborts the whole request with a [`PluginError`].

pub mod chat_manage;
pub mod event;
pub mod manager;
pub mod pipeline;
pub mod plugin;
pub mod stages;

pub use chat_manage::{ChatManage, RequestContext, SummaryConfig};
pub use event::EventType;
pub use manager::EventManager;
pub use pipeline::{
    PipelineKind, PipelineSummary, ProgressReporter, SilentProgress, default_event_manager,
    run_pipeline,
};
pub use plugin::{ChainResult, Next, Plugin, PluginError, PluginErrorKind, Proceeded};
