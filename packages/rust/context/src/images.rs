//! Inline enrichment of markdown image references with captions and OCR text.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use kbchat_shared::{ImageInfo, SearchResult};

/// Markdown image reference: `![alt](url)`. Alt text is ignored.
static MARKDOWN_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

/// Passage text for a result with its image descriptors merged in.
pub fn enrich_passage(result: &SearchResult) -> String {
    match result.image_infos() {
        Ok(infos) => merge_image_infos(&result.content, &infos),
        Err(e) => {
            warn!(result_id = %result.id, error = %e, "failed to parse image info, skipping enrichment");
            result.content.clone()
        }
    }
}

/// Merge the JSON image descriptor list `image_info` into `content`.
///
/// Every markdown reference whose url (or original url) has a descriptor is
/// followed by that descriptor's caption and OCR text. Descriptors not
/// referenced anywhere in the content are listed in a trailing block.
/// Unparseable descriptor JSON leaves the content unchanged.
pub fn enrich_with_image_info(content: &str, image_info: &str) -> String {
    match serde_json::from_str::<Vec<ImageInfo>>(image_info) {
        Ok(infos) => merge_image_infos(content, &infos),
        Err(e) => {
            warn!(error = %e, "failed to parse image info, skipping enrichment");
            content.to_string()
        }
    }
}

fn merge_image_infos(content: &str, infos: &[ImageInfo]) -> String {
    if infos.is_empty() {
        return content.to_string();
    }

    let mut by_url: HashMap<&str, &ImageInfo> = HashMap::new();
    for info in infos {
        if !info.url.is_empty() {
            by_url.insert(&info.url, info);
        }
        if !info.original_url.is_empty() {
            by_url.insert(&info.original_url, info);
        }
    }

    let mut referenced: HashSet<String> = HashSet::new();
    let mut inline_count = 0usize;
    let mut enriched = MARKDOWN_IMAGE_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let reference = &caps[0];
            let url = &caps[2];
            referenced.insert(url.to_string());

            match by_url.get(url) {
                Some(info) => {
                    inline_count += 1;
                    let mut replacement = format!("{reference}\n");
                    if !info.caption.is_empty() {
                        replacement.push_str(&format!("Image caption: {}\n", info.caption));
                    }
                    if !info.ocr_text.is_empty() {
                        replacement.push_str(&format!("Image text: {}\n", info.ocr_text));
                    }
                    replacement
                }
                None => reference.to_string(),
            }
        })
        .into_owned();

    let mut additional = Vec::new();
    for info in infos {
        if referenced.contains(&info.url) || referenced.contains(&info.original_url) {
            continue;
        }
        if !info.caption.is_empty() {
            additional.push(format!("Image {} caption: {}", info.url, info.caption));
        }
        if !info.ocr_text.is_empty() {
            additional.push(format!("Image {} text: {}", info.url, info.ocr_text));
        }
    }

    if !additional.is_empty() {
        if !enriched.is_empty() {
            enriched.push_str("\n\n");
        }
        enriched.push_str("Additional image information:\n");
        enriched.push_str(&additional.join("\n"));
    }

    debug!(
        markdown_images = referenced.len(),
        inline = inline_count,
        additional = additional.len(),
        "image enrichment applied"
    );

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_and_unreferenced_images_are_both_kept() {
        let content = "![x](http://a/1.png)";
        let info = r#"[
            {"url": "http://a/1.png", "caption": "A"},
            {"url": "http://a/2.png", "caption": "B"}
        ]"#;

        let enriched = enrich_with_image_info(content, info);

        let inline = enriched.find("Image caption: A").expect("inline caption");
        let trailing_block = enriched
            .find("Additional image information:")
            .expect("trailing block");
        assert!(enriched.starts_with("![x](http://a/1.png)\nImage caption: A"));
        assert!(inline < trailing_block);
        assert!(enriched.contains("Image http://a/2.png caption: B"));
        assert!(!enriched[..trailing_block].contains('B'));
    }

    #[test]
    fn original_url_is_a_fallback_key() {
        let content = "see ![diagram](https://cdn/orig.png) above";
        let info = r#"[{"url": "s3://bucket/1.png", "original_url": "https://cdn/orig.png",
                       "caption": "Flow", "ocr_text": "step 1"}]"#;

        let enriched = enrich_with_image_info(content, info);
        assert!(enriched.contains("![diagram](https://cdn/orig.png)\nImage caption: Flow\nImage text: step 1\n above"));
        assert!(!enriched.contains("Additional image information"));
    }

    #[test]
    fn repeated_reference_is_annotated_at_every_occurrence() {
        let content = "![a](u1) and again ![b](u1)";
        let info = r#"[{"url": "u1", "caption": "cap"}]"#;

        let enriched = enrich_with_image_info(content, info);
        assert_eq!(enriched.matches("Image caption: cap").count(), 2);
        assert_eq!(
            enriched,
            "![a](u1)\nImage caption: cap\n and again ![b](u1)\nImage caption: cap\n"
        );
    }

    #[test]
    fn empty_and_unmatched_descriptors() {
        let content = "![x](http://a/9.png)";
        let info = r#"[{"url": "http://a/9.png"}]"#;
        // Descriptor found but empty: the reference gains only a newline.
        assert_eq!(enrich_with_image_info(content, info), "![x](http://a/9.png)\n");

        let info = r#"[{"url": "http://other.png", "ocr_text": "T"}]"#;
        let enriched = enrich_with_image_info(content, info);
        assert!(enriched.starts_with("![x](http://a/9.png)\n\nAdditional image information:\n"));
        assert!(enriched.ends_with("Image http://other.png text: T"));
    }

    #[test]
    fn invalid_json_leaves_content_unchanged() {
        assert_eq!(enrich_with_image_info("body", "{not json"), "body");
    }

    #[test]
    fn empty_content_gets_only_trailing_block() {
        let enriched = enrich_with_image_info("", r#"[{"url": "u", "caption": "c"}]"#);
        assert_eq!(enriched, "Additional image information:\nImage u caption: c");
    }

    #[test]
    fn passage_without_image_info_is_raw_content() {
        let result = SearchResult {
            id: "c-1".into(),
            content: "plain ![x](u)".into(),
            image_info: None,
            score: 0.5,
            match_type: Default::default(),
            chunk_type: Default::default(),
            knowledge_id: String::new(),
            knowledge_title: String::new(),
            chunk_index: 0,
        };
        assert_eq!(enrich_passage(&result), "plain ![x](u)");
    }

    #[test]
    fn passage_with_malformed_image_info_is_raw_content() {
        let result = SearchResult {
            id: "c-2".into(),
            content: "see ![x](u)".into(),
            image_info: Some("[{broken".into()),
            score: 0.5,
            match_type: Default::default(),
            chunk_type: Default::default(),
            knowledge_id: String::new(),
            knowledge_title: String::new(),
            chunk_index: 0,
        };
        assert_eq!(enrich_passage(&result), "see ![x](u)");
    }
}
