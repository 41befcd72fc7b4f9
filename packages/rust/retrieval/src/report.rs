//! Human-readable retrieval report, used by the CLI to show what was found.

use std::fmt::Write;

use kbchat_shared::SearchResult;

use crate::fanout::SourceError;

/// Text shown when nothing was retrieved.
pub const NO_RESULTS: &str = "No relevant information found.";

/// Map a score to a relevance label.
pub fn relevance_level(score: f64) -> &'static str {
    match score {
        s if s >= 0.8 => "Highly Relevant",
        s if s >= 0.6 => "Moderately Relevant",
        s if s >= 0.4 => "Low Relevance",
        _ => "Weak Relevance",
    }
}

/// Render fused results grouped by origin document, with partial failures
/// listed ahead of the results.
pub fn render_retrieval_report(query: &str, results: &[SearchResult], errors: &[SourceError]) -> String {
    let mut out = String::new();

    if !errors.is_empty() {
        out.push_str("=== Partial Failures ===\n");
        for error in errors {
            let _ = writeln!(out, "  - {error}");
        }
        out.push('\n');
    }

    if results.is_empty() {
        out.push_str(NO_RESULTS);
        return out;
    }

    let _ = writeln!(out, "Query: {query}");
    let _ = writeln!(out, "Found {} relevant results (deduplicated)\n", results.len());

    let mut current_document: Option<&str> = None;
    for (i, result) in results.iter().enumerate() {
        if current_document != Some(result.knowledge_id.as_str()) {
            current_document = Some(result.knowledge_id.as_str());
            if i > 0 {
                out.push('\n');
            }
            let title = if result.knowledge_title.is_empty() {
                &result.knowledge_id
            } else {
                &result.knowledge_title
            };
            let _ = writeln!(out, "[Source Document: {title}]\n");
        }

        let _ = writeln!(out, "Result #{}:", i + 1);
        let _ = writeln!(
            out,
            "  Relevance: {:.2} ({})",
            result.score,
            relevance_level(result.score)
        );
        let _ = writeln!(out, "  Match Type: {}", result.match_type.label());
        let _ = writeln!(out, "  Content: {}", result.content);
        let _ = writeln!(out, "  chunk_id: {}\n", result.id);
    }

    out
}
