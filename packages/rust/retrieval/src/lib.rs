//! Multi-source retrieval and result fusion.
//!
//! This crate provides:
//! - [`KnowledgeSearch`], the search capability every knowledge source implements
//! - [`HttpSearchSource`] and [`SourceRegistry`] for HTTP-backed sources
//! - [`FanOut`], concurrent per-source retrieval with partial-failure tolerance
//! - [`fusion`], dedup, score ordering, and FAQ/document partitioning
//! - [`report`], a human-readable retrieval report

pub mod fanout;
pub mod fusion;
pub mod http;
pub mod report;
pub mod source;

pub use fanout::{FanOut, FanOutOutcome, SourceError};
pub use fusion::{FaqPartition, fuse, partition_faq, sort_by_score, truncate_top_k};
pub use http::HttpSearchSource;
pub use report::{NO_RESULTS, relevance_level, render_retrieval_report};
pub use source::{KnowledgeSearch, RegisteredSource, SearchParams, SourceRegistry};
