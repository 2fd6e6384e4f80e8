//! Label normalization for matching table titles, column and row labels.
//!
//! Crosstab exports are inconsistent about whitespace, case and compatibility
//! characters (non-breaking spaces, full-width letters), so lookups that fail
//! on the exact label fall back to comparing normalized forms.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Regex to collapse whitespace runs (including non-breaking spaces after NFKC).
static WHITESPACE_COLLAPSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Column labels treated as the "Total" column, in order of preference.
pub const TOTAL_LABELS: &[&str] = &["total", "overall", "all"];

/// Normalize a label for comparison.
///
/// Applies NFKC, collapses whitespace runs to one space, trims and lowercases.
pub fn normalize_label(label: &str) -> String {
    let composed: String = label.nfkc().collect();
    WHITESPACE_COLLAPSE_REGEX
        .replace_all(composed.trim(), " ")
        .to_lowercase()
}

/// Check whether two labels are equal after normalization.
pub fn labels_match(a: &str, b: &str) -> bool {
    a == b || normalize_label(a) == normalize_label(b)
}

/// Check whether a label names the total column ("Total", "Overall", "All").
pub fn is_total_label(label: &str) -> bool {
    let normalized = normalize_label(label);
    TOTAL_LABELS.contains(&normalized.as_str())
}

/// Find the index of `label` in `labels`, exact match first, then normalized.
pub fn position_of(labels: &[String], label: &str) -> Option<usize> {
    labels.iter().position(|l| l == label).or_else(|| {
        let wanted = normalize_label(label);
        labels.iter().position(|l| normalize_label(l) == wanted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Q  Age "), "q age");
        assert_eq!(normalize_label("Q\u{00A0}Age"), "q age");
        assert_eq!(normalize_label("ＴＯＴＡＬ"), "total");
        assert_eq!(normalize_label("Line\none"), "line one");
    }

    #[test]
    fn test_labels_match() {
        assert!(labels_match("Q Age", "q  age"));
        assert!(!labels_match("Q Age", "Q Gender"));
    }

    #[test]
    fn test_is_total_label() {
        assert!(is_total_label("Total"));
        assert!(is_total_label(" OVERALL "));
        assert!(is_total_label("All"));
        assert!(!is_total_label("Male"));
    }

    #[test]
    fn test_position_of_prefers_exact() {
        let labels = vec!["total".to_string(), "Total".to_string()];
        assert_eq!(position_of(&labels, "Total"), Some(1));
        assert_eq!(position_of(&labels, "TOTAL"), Some(0));
        assert_eq!(position_of(&labels, "Male"), None);
    }
}
