//! Result fusion: dedup by id, order by score, and FAQ/document partitioning.

use std::cmp::Ordering;
use std::collections::HashSet;

use kbchat_shared::SearchResult;

/// Fuse per-source result lists into one ranked list.
///
/// Lists must be supplied in the caller's source order. The first occurrence of
/// an id wins and later duplicates are dropped with their scores. The output is
/// stable-sorted by score descending so equal scores keep dedup order.
pub fn fuse<I>(per_source: I) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    let mut seen = HashSet::new();
    let mut fused: Vec<SearchResult> = per_source
        .into_iter()
        .flatten()
        .filter(|result| seen.insert(result.id.clone()))
        .collect();

    sort_by_score(&mut fused);
    fused
}

/// Stable sort by score, highest first. Incomparable scores (NaN) count as equal.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Keep at most `top_k` results. `0` keeps everything.
pub fn truncate_top_k(results: &mut Vec<SearchResult>, top_k: usize) {
    if top_k > 0 && results.len() > top_k {
        results.truncate(top_k);
    }
}

// ---------------------------------------------------------------------------
// FAQ priority
// ---------------------------------------------------------------------------

/// Fused results split into FAQ entries and document entries.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqPartition<'a> {
    /// FAQ results in fused order.
    pub faq: Vec<&'a SearchResult>,
    /// Every other result in fused order.
    pub docs: Vec<&'a SearchResult>,
    /// Set when the top FAQ result met the direct-answer threshold.
    pub high_confidence: bool,
}

impl FaqPartition<'_> {
    /// Whether the FAQ entry at `index` carries the high-confidence mark.
    /// Only the first entry can ever be marked.
    pub fn is_flagged(&self, index: usize) -> bool {
        self.high_confidence && index == 0
    }
}

/// Partition fused results into FAQ and document lists and gate the top FAQ
/// entry against `threshold`.
pub fn partition_faq(results: &[SearchResult], threshold: f64) -> FaqPartition<'_> {
    let (faq, docs): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_faq());
    let high_confidence = faq.first().is_some_and(|top| top.score >= threshold);

    FaqPartition {
        faq,
        docs,
        high_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbchat_shared::{ChunkType, MatchType};

    fn result(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.into(),
            content: format!("content of {id}"),
            image_info: None,
            score,
            match_type: MatchType::Embedding,
            chunk_type: ChunkType::Text,
            knowledge_id: "k-1".into(),
            knowledge_title: "Doc".into(),
            chunk_index: 0,
        }
    }

    fn faq(id: &str, score: f64) -> SearchResult {
        SearchResult {
            chunk_type: ChunkType::Faq,
            ..result(id, score)
        }
    }

    #[test]
    fn duplicate_id_keeps_first_source_attributes() {
        let mut from_a = result("shared", 0.4);
        from_a.knowledge_title = "From A".into();
        let mut from_b = result("shared", 0.99);
        from_b.knowledge_title = "From B".into();

        let fused = fuse(vec![vec![from_a, result("a-2", 0.5)], vec![from_b]]);

        let shared: Vec<_> = fused.iter().filter(|r| r.id == "shared").collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].knowledge_title, "From A");
        assert_eq!(shared[0].score, 0.4);
    }

    #[test]
    fn fused_scores_are_non_increasing() {
        let fused = fuse(vec![
            vec![result("a", 0.1), result("b", 0.7), result("c", 0.3)],
            vec![result("d", 0.9), result("e", 0.3), result("f", 12.0)],
        ]);
        assert_eq!(fused.len(), 6);
        for pair in fused.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn equal_scores_keep_dedup_order() {
        let fused = fuse(vec![
            vec![result("x", 0.5), result("y", 0.5)],
            vec![result("z", 0.5)],
        ]);
        let ids: Vec<_> = fused.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn nan_scores_do_not_panic() {
        let fused = fuse(vec![vec![result("a", f64::NAN), result("b", 0.2)]]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn empty_input_fuses_to_empty_list() {
        assert!(fuse(Vec::<Vec<SearchResult>>::new()).is_empty());
        assert!(fuse(vec![Vec::new(), Vec::new()]).is_empty());
    }

    #[test]
    fn truncate_top_k_zero_keeps_all() {
        let mut results = vec![result("a", 0.3), result("b", 0.2), result("c", 0.1)];
        truncate_top_k(&mut results, 0);
        assert_eq!(results.len(), 3);
        truncate_top_k(&mut results, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].id, "b");
    }

    #[test]
    fn faq_threshold_flags_only_first_entry() {
        let fused = vec![faq("f-1", 0.92), result("d-1", 0.7), faq("f-2", 0.5)];

        let partition = partition_faq(&fused, 0.8);
        assert!(partition.high_confidence);
        assert!(partition.is_flagged(0));
        assert!(!partition.is_flagged(1));
        assert_eq!(partition.faq.len(), 2);
        assert_eq!(partition.docs.len(), 1);

        let partition = partition_faq(&fused, 0.95);
        assert!(!partition.high_confidence);
        assert!(!partition.is_flagged(0));
    }

    #[test]
    fn later_faq_above_threshold_is_never_flagged() {
        let fused = vec![faq("f-1", 0.6), faq("f-2", 0.6)];
        let partition = partition_faq(&fused, 0.5);
        assert!(partition.is_flagged(0));
        assert!(!partition.is_flagged(1));

        let partition = partition_faq(&fused, 0.7);
        assert!(!partition.is_flagged(0));
        assert!(!partition.is_flagged(1));
    }

    #[test]
    fn partition_preserves_fused_order() {
        let fused = vec![
            result("d-1", 0.9),
            faq("f-1", 0.8),
            result("d-2", 0.7),
            faq("f-2", 0.6),
        ];
        let partition = partition_faq(&fused, 0.9);
        let faq_ids: Vec<_> = partition.faq.iter().map(|r| r.id.as_str()).collect();
        let doc_ids: Vec<_> = partition.docs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(faq_ids, vec!["f-1", "f-2"]);
        assert_eq!(doc_ids, vec!["d-1", "d-2"]);
    }
}
