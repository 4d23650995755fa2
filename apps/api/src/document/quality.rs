//! Advisory (non-fatal) quality warnings for a cleaned document.

use once_cell::sync::Lazy;
use regex::Regex;

const MIN_WORDS: usize = 150;
const MAX_WORDS: usize = 1200;
const MAX_PAGES: usize = 3;

pub const WARN_TOO_SHORT: &str =
    "Your résumé looks too short. Add more detail about your experience and impact for a useful review.";
pub const WARN_TOO_LONG: &str =
    "Your résumé is long. Consider trimming it to the most relevant 1-2 pages.";
pub const WARN_ENCODING: &str =
    "Some text may not have been read correctly (formatting/encoding issue). Check the extracted text before submitting.";

/// Literal escape sequences such as `\n` or `\u00e9` that leaked into the text.
static LITERAL_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:[nrt]|u[0-9a-fA-F]{4})").expect("valid regex"));

/// Checks metrics and content, returning warnings in a stable order.
pub fn assess(text: &str, word_count: usize, page_count: usize) -> Vec<String> {
    let mut warnings = Vec::new();

    if word_count < MIN_WORDS {
        warnings.push(WARN_TOO_SHORT.to_string());
    } else if word_count > MAX_WORDS || page_count > MAX_PAGES {
        warnings.push(WARN_TOO_LONG.to_string());
    }

    if has_encoding_issue(text) {
        warnings.push(WARN_ENCODING.to_string());
    }

    warnings
}

fn has_encoding_issue(text: &str) -> bool {
    text.contains('\u{FFFD}')
        // UTF-8 read back as Windows-1252
        || text.contains("â€")
        || text.contains("Ã©")
        || LITERAL_ESCAPE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_document_warns() {
        let w = assess("a few words", 3, 1);
        assert_eq!(w, vec![WARN_TOO_SHORT.to_string()]);
    }

    #[test]
    fn test_healthy_length_has_no_warnings() {
        assert!(assess("clean text", 400, 1).is_empty());
    }

    #[test]
    fn test_long_document_warns() {
        assert_eq!(assess("text", 1300, 3), vec![WARN_TOO_LONG.to_string()]);
    }

    #[test]
    fn test_page_estimate_over_limit_warns() {
        assert_eq!(assess("text", 1000, 4), vec![WARN_TOO_LONG.to_string()]);
    }

    #[test]
    fn test_replacement_character_warns() {
        let w = assess("Caf\u{FFFD} owner", 400, 1);
        assert!(w.contains(&WARN_ENCODING.to_string()));
    }

    #[test]
    fn test_literal_escape_warns() {
        let w = assess(r"Led team\nShipped product", 400, 1);
        assert!(w.contains(&WARN_ENCODING.to_string()));
    }

    #[test]
    fn test_windows_path_is_not_an_escape() {
        // `\d` is not one of the escapes we look for
        assert!(assess(r"C:\dev\projects", 400, 1).is_empty());
    }
}
