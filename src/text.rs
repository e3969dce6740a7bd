//! Text processing: HTML stripping, normalization, chunking, and
//! tariff-code extraction.
//!
//! Stored document text keeps its original content for display; the
//! whitelist normalization in [`normalize_text`] is applied only on the
//! way into the embedding model.

use anyhow::{bail, Result};
use regex::Regex;
use scraper::Html;

/// Strip HTML markup down to its visible text.
///
/// Text nodes are trimmed and joined with single spaces, so
/// `<p>This is <b>bold</b> text.</p>` becomes `This is bold text.`.
pub fn strip_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().text() {
        let trimmed = node.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(trimmed);
    }

    collapse_whitespace(&text)
}

/// Normalize text for embedding: collapse whitespace and drop characters
/// outside word characters, whitespace, and basic punctuation.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let collapsed = collapse_whitespace(text);
    let whitelist = Regex::new(r"[^\w\s.,;:!?\-()]").unwrap();
    whitelist.replace_all(&collapsed, "").trim().to_string()
}

/// Split text into overlapping word windows.
///
/// Texts of `chunk_size` words or fewer come back as a single chunk equal
/// to the whole input. Longer texts slide a `chunk_size`-word window with
/// step `chunk_size - overlap`, each window joined by single spaces.
///
/// # Errors
///
/// `overlap >= chunk_size` makes the step non-positive and is rejected as
/// invalid configuration.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    if overlap >= chunk_size {
        bail!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap,
            chunk_size
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return Ok(vec![]);
    }

    if words.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        start += chunk_size - overlap;
    }

    Ok(chunks)
}

/// Extract HTS codes (`XXXX.XX.XX`) from free text.
///
/// Returns a deduplicated, sorted list so callers get a stable order.
pub fn extract_hts_codes(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    let pattern = Regex::new(r"\b\d{4}\.\d{2}\.\d{2}\b").unwrap();
    let mut codes: Vec<String> = pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    codes.sort();
    codes.dedup();
    codes
}

fn collapse_whitespace(text: &str) -> String {
    let ws = Regex::new(r"\s+").unwrap();
    ws.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_basic() {
        assert_eq!(
            strip_html("<p>This is <b>bold</b> text.</p>"),
            "This is bold text."
        );
    }

    #[test]
    fn test_strip_html_empty() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("   "), "");
    }

    #[test]
    fn test_strip_html_collapses_whitespace() {
        let out = strip_html("<div>a\n\n   b</div>");
        assert_eq!(out, "a b");
    }

    #[test]
    fn test_normalize_removes_special_characters() {
        let out = normalize_text("Duty @ 5% — see §1401(a); rate: 2.4¢/kg!");
        assert!(!out.contains('@'));
        assert!(!out.contains('§'));
        assert!(!out.contains('¢'));
        assert!(out.contains("see 1401(a);"));
        assert!(out.contains("rate: 2.4kg!"));
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a   b\t\nc"), "a b c");
    }

    #[test]
    fn test_chunk_small_text_returned_whole() {
        let text = "only a few words here";
        let chunks = chunk_text(text, 512, 50).unwrap();
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_chunk_empty() {
        assert!(chunk_text("", 512, 50).unwrap().is_empty());
        assert!(chunk_text("   \n ", 512, 50).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_overlap_windows() {
        let text = "a b c d e f g h i j";
        let chunks = chunk_text(text, 4, 1).unwrap();
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);
    }

    #[test]
    fn test_chunk_no_overlap() {
        let text = "a b c d e f g h";
        let chunks = chunk_text(text, 4, 0).unwrap();
        assert_eq!(chunks, vec!["a b c d", "e f g h"]);
    }

    #[test]
    fn test_chunk_count_formula() {
        // ceil((N - overlap) / (chunk_size - overlap)) when evenly divisible
        let words: Vec<String> = (0..100).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 20, 10).unwrap();
        // (100 - 10) / (20 - 10) = 9
        assert_eq!(chunks.len(), 9);

        // Consecutive chunks share exactly `overlap` words
        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].split_whitespace().collect();
            let right: Vec<&str> = pair[1].split_whitespace().collect();
            assert_eq!(left[left.len() - 10..], right[..10]);
        }
    }

    #[test]
    fn test_chunk_rejects_overlap_at_or_above_chunk_size() {
        assert!(chunk_text("a b c", 4, 4).is_err());
        assert!(chunk_text("a b c", 4, 9).is_err());
    }

    #[test]
    fn test_extract_hts_codes() {
        let codes = extract_hts_codes(
            "Import duties for HTS 0406.10.00 and 0406.30.00 are listed.",
        );
        assert_eq!(codes, vec!["0406.10.00", "0406.30.00"]);
    }

    #[test]
    fn test_extract_hts_codes_dedupes() {
        let codes = extract_hts_codes("0406.10.00 appears twice: 0406.10.00");
        assert_eq!(codes, vec!["0406.10.00"]);
    }

    #[test]
    fn test_extract_hts_codes_ignores_other_numbers() {
        let codes = extract_hts_codes("Docket 2025-12345, part 141.0, 12.34.56");
        assert!(codes.is_empty());
    }
}
