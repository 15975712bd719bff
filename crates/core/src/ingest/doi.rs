//! DOI text handling.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static DOI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:A-Z0-9]+\b").expect("valid DOI pattern")
});

/// Find the first DOI in a block of text.
pub fn extract_doi(text: &str) -> Option<String> {
    DOI_PATTERN
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

/// Split comma-separated DOI input into keys.
///
/// Entries are trimmed and empty entries dropped; order is preserved and no
/// other normalization is applied.
pub fn parse_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
