//! Context assembly: turns fused retrieval results into the prompt text handed
//! to the chat model.
//!
//! Assembly runs in a fixed order:
//! 1. Validate the raw query ([`sanitize::validate_query`])
//! 2. Enrich each passage with its image captions and OCR text ([`images`])
//! 3. Render the passages in FAQ-priority or flat mode ([`build_contexts`])
//! 4. Substitute the template placeholders ([`template::render_template`])

pub mod images;
pub mod sanitize;
pub mod template;

use std::fmt::Write;

use chrono::{DateTime, TimeZone};
use tracing::{debug, info, instrument};

use kbchat_retrieval::{NO_RESULTS, partition_faq};
use kbchat_shared::{Result, SearchResult};

pub use images::{enrich_passage, enrich_with_image_info};
pub use sanitize::{contains_unsafe_markup, sanitize_for_log, validate_query, validate_query_bytes};
pub use template::{
    PromptField, PromptPlaceholder, placeholders_for, render_template, render_time_placeholders,
    weekday_name,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How fused results are rendered into the context block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Render FAQ entries in their own leading section.
    pub faq_priority_enabled: bool,
    /// Score at or above which the top FAQ entry is marked as an exact match.
    pub faq_direct_answer_threshold: f64,
}

/// The assembled prompt and what shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Template with every placeholder substituted.
    pub user_content: String,
    /// The validated, trimmed query.
    pub query: String,
    /// Whether the two-section FAQ layout was used.
    pub faq_sections: bool,
    /// Whether the top FAQ entry was marked as an exact match.
    pub high_confidence_faq: bool,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Rendered contexts plus the FAQ flags that shaped them.
struct RenderedContexts {
    text: String,
    faq_sections: bool,
    high_confidence_faq: bool,
}

fn render_contexts(results: &[SearchResult], opts: RenderOptions) -> RenderedContexts {
    if results.is_empty() {
        return RenderedContexts {
            text: NO_RESULTS.to_string(),
            faq_sections: false,
            high_confidence_faq: false,
        };
    }

    if opts.faq_priority_enabled {
        let partition = partition_faq(results, opts.faq_direct_answer_threshold);
        debug!(
            faq_count = partition.faq.len(),
            doc_count = partition.docs.len(),
            has_high_confidence = partition.high_confidence,
            "faq separation"
        );

        if !partition.faq.is_empty() {
            let mut out = String::new();
            out.push_str("### Source 1: Standard Q&A Library (FAQ)\n");
            out.push_str("[High Confidence - Please prioritize]\n");
            for (i, result) in partition.faq.iter().enumerate() {
                let passage = enrich_passage(result);
                if partition.is_flagged(i) {
                    let _ = writeln!(out, "[FAQ-{}] ⭐ Exact Match: {passage}", i + 1);
                } else {
                    let _ = writeln!(out, "[FAQ-{}] {passage}", i + 1);
                }
            }

            if !partition.docs.is_empty() {
                out.push_str("\n### Source 2: Reference Documents\n");
                out.push_str("[Supplementary Material - Only refer when FAQ cannot answer]\n");
                for (i, result) in partition.docs.iter().enumerate() {
                    let _ = writeln!(out, "[DOC-{}] {}", i + 1, enrich_passage(result));
                }
            }

            return RenderedContexts {
                text: out,
                faq_sections: true,
                high_confidence_faq: partition.high_confidence,
            };
        }
    }

    let text = results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("[{}] {}", i + 1, enrich_passage(result)))
        .collect::<Vec<_>>()
        .join("\n\n");

    RenderedContexts {
        text,
        faq_sections: false,
        high_confidence_faq: false,
    }
}

/// Render fused results as the `{{contexts}}` block.
///
/// With FAQ priority enabled and at least one FAQ result, FAQ entries form a
/// leading section and documents a supplementary one. Otherwise every result
/// is listed in fusion order, one-indexed. An empty list renders as
/// [`NO_RESULTS`].
pub fn build_contexts(results: &[SearchResult], opts: RenderOptions) -> String {
    render_contexts(results, opts).text
}

/// Validate the query, render the contexts and substitute the template.
///
/// Fails with [`KbChatError::TemplateExecute`](kbchat_shared::KbChatError::TemplateExecute)
/// when the query does not pass input-safety validation.
#[instrument(skip_all, fields(results = results.len(), template_len = template.len()))]
pub fn assemble<Tz>(
    query: &str,
    results: &[SearchResult],
    template: &str,
    opts: RenderOptions,
    now: &DateTime<Tz>,
) -> Result<AssembledContext>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let safe_query = validate_query(query)?;
    let rendered = render_contexts(results, opts);
    let user_content = render_template(template, &safe_query, &rendered.text, now);

    info!(
        user_content_len = user_content.len(),
        faq_sections = rendered.faq_sections,
        high_confidence_faq = rendered.high_confidence_faq,
        "context assembled"
    );

    Ok(AssembledContext {
        user_content,
        query: safe_query,
        faq_sections: rendered.faq_sections,
        high_confidence_faq: rendered.high_confidence_faq,
    })
}
