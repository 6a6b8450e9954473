//! Literal issue/PR reference parsing (spec §4.3 "post-hoc validation":
//! `#N`, `GH-N`, `PR N` variants). Grounded on the teacher's
//! `regex`-based line-number pattern matching.

use regex::Regex;
use std::sync::OnceLock;

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"#(\d+)").unwrap(),
            Regex::new(r"(?i)GH-(\d+)").unwrap(),
            Regex::new(r"(?i)PR\s+(\d+)").unwrap(),
        ]
    })
}

/// Whether `text` literally names `number` via any of the accepted
/// reference spellings.
pub fn contains_reference(text: &str, number: i64) -> bool {
    let target = number.to_string();
    patterns().iter().any(|re| re.captures_iter(text).any(|c| c[1] == target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_hash_style_references() {
        assert!(contains_reference("Fix authentication timeout bug (#127)", 127));
        assert!(!contains_reference("Fix authentication timeout bug (#128)", 127));
    }

    #[test]
    fn recognizes_gh_and_pr_style_references() {
        assert!(contains_reference("see GH-42 for context", 42));
        assert!(contains_reference("closes PR 42", 42));
    }

    #[test]
    fn does_not_false_positive_on_unrelated_numbers() {
        assert!(!contains_reference("upgraded to v1.42.0", 42));
    }
}
