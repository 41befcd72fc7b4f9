//! Input-safety checks for user text.
//!
//! The query is the one piece of user input that reaches the prompt verbatim,
//! so it is validated here before any template substitution.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use kbchat_shared::{KbChatError, Result};

/// Markup and script patterns rejected in user input.
static UNSAFE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<script[^>]*>.*?</script>",
        r"(?i)<iframe[^>]*>.*?</iframe>",
        r"(?i)<object[^>]*>.*?</object>",
        r"(?i)<embed[^>]*>.*?</embed>",
        r"(?i)<embed[^>]*>",
        r"(?i)<form[^>]*>.*?</form>",
        r"(?i)<input[^>]*>",
        r"(?i)<button[^>]*>.*?</button>",
        r"(?i)javascript:",
        r"(?i)vbscript:",
        r"(?i)onload\s*=",
        r"(?i)onerror\s*=",
        r"(?i)onclick\s*=",
        r"(?i)onmouseover\s*=",
        r"(?i)onfocus\s*=",
        r"(?i)onblur\s*=",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Whether `input` matches any known injection pattern.
pub fn contains_unsafe_markup(input: &str) -> bool {
    UNSAFE_PATTERNS.iter().any(|re| re.is_match(input))
}

/// Control characters other than tab, newline and carriage return.
fn is_forbidden_control(c: char) -> bool {
    (c as u32) < 32 && !matches!(c, '\t' | '\n' | '\r')
}

/// Validate a query and return it trimmed.
///
/// An empty query is valid and yields an empty string. Forbidden control
/// characters or injection patterns fail with [`KbChatError::TemplateExecute`].
pub fn validate_query(input: &str) -> Result<String> {
    if input.is_empty() {
        return Ok(String::new());
    }
    if input.chars().any(is_forbidden_control) {
        return Err(KbChatError::template_execute(
            "user query contains invalid control characters",
        ));
    }
    if contains_unsafe_markup(input) {
        return Err(KbChatError::template_execute(
            "user query contains invalid content",
        ));
    }
    Ok(input.trim().to_string())
}

/// Validate a raw byte query, rejecting invalid UTF-8 before the text checks.
pub fn validate_query_bytes(input: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(input)
        .map_err(|_| KbChatError::template_execute("user query is not valid UTF-8"))?;
    validate_query(text)
}

/// Collapse control characters (including newlines) to spaces so user text
/// cannot forge log lines.
pub fn sanitize_for_log(input: &str) -> Cow<'_, str> {
    if !input.chars().any(char::is_control) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(
        input
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_query_is_trimmed() {
        assert_eq!(
            validate_query("  how do I reset my password?\n").unwrap(),
            "how do I reset my password?"
        );
    }

    #[test]
    fn empty_query_is_valid() {
        assert_eq!(validate_query("").unwrap(), "");
    }

    #[test]
    fn tabs_and_newlines_are_allowed() {
        assert!(validate_query("line one\n\tline two\r\n").is_ok());
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = validate_query("hello\u{0007}world").unwrap_err();
        assert!(matches!(err, KbChatError::TemplateExecute { .. }));
        assert!(validate_query("nul\u{0000}byte").is_err());
    }

    #[test]
    fn injection_patterns_are_rejected() {
        for input in [
            "<script>alert(1)</script>",
            "<SCRIPT src=x></SCRIPT>",
            "<iframe src=evil></iframe>",
            "<embed src=x>",
            "<input type=text>",
            "click javascript:void(0)",
            "VBScript:msgbox",
            "<img onerror = steal()>",
            "<div onMouseOver=x>",
        ] {
            let err = validate_query(input).unwrap_err();
            assert!(
                matches!(err, KbChatError::TemplateExecute { .. }),
                "expected rejection for {input}"
            );
        }
    }

    #[test]
    fn lookalike_words_are_allowed() {
        assert!(validate_query("how do I download a javascript file").is_ok());
        assert!(validate_query("what does onload do in the browser").is_ok());
    }

    #[test]
    fn invalid_utf8_bytes_are_rejected() {
        let err = validate_query_bytes(&[0x66, 0x6f, 0xff, 0x6f]).unwrap_err();
        assert!(matches!(err, KbChatError::TemplateExecute { .. }));
        assert_eq!(validate_query_bytes(b" ok ").unwrap(), "ok");
    }

    #[test]
    fn log_sanitizer_collapses_newlines() {
        assert_eq!(sanitize_for_log("a\nINFO forged\r\nb"), "a INFO forged  b");
        assert!(matches!(sanitize_for_log("clean"), Cow::Borrowed(_)));
    }
}
