//! Merge & filter (spec §4.3): dedupe by `(issue, commit, pr)`, combine
//! confidences, apply the post-hoc literal-reference penalty, and drop
//! anything below the retention floor.

use std::collections::HashMap;

use coderisk_core::types::IssueCommitRef;

const MERGE_BOOST_PER_SOURCE: f64 = 0.03;
const CONFIDENCE_CAP: f64 = 0.98;
const RETENTION_FLOOR: f64 = 0.40;
const MISSING_LITERAL_PENALTY: f64 = 0.5;

type Key = (i64, Option<String>, Option<i64>);

fn key_of(r: &IssueCommitRef) -> Key {
    (r.issue_number, r.commit_sha.clone(), r.pr_number)
}

/// `text_of` resolves a merged ref's literal source text (the commit
/// message or PR body) for the post-hoc `#N` validation; `None` when the
/// ref isn't attached to a commit or PR SS knows about, which skips the
/// check rather than penalizing an untestable claim.
pub fn merge(
    raw: Vec<IssueCommitRef>,
    text_of: impl Fn(&IssueCommitRef) -> Option<String>,
    contains_reference: impl Fn(&str, i64) -> bool,
) -> Vec<IssueCommitRef> {
    let mut groups: HashMap<Key, Vec<IssueCommitRef>> = HashMap::new();
    for r in raw {
        groups.entry(key_of(&r)).or_default().push(r);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for (_key, mut members) in groups {
        members.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        // Prefer a fixing-class action when both fixing and mentions
        // claims exist for the same tuple (spec §4.3 "prefer fixes over
        // mentions when both are claimed").
        let chosen = members.iter().find(|m| m.action.is_fixing()).or_else(|| members.first()).unwrap().clone();

        let base_confidence = members.iter().map(|m| m.confidence).fold(0.0, f64::max);
        let extra_sources = members.len().saturating_sub(1) as f64;
        let mut confidence = (base_confidence + MERGE_BOOST_PER_SOURCE * extra_sources).min(CONFIDENCE_CAP);

        let evidence: Vec<String> = members.iter().flat_map(|m| m.evidence.clone()).collect();

        let mut out = chosen;
        out.evidence = evidence;

        if out.action.is_fixing() {
            if let Some(text) = text_of(&out) {
                if !contains_reference(&text, out.issue_number) {
                    confidence *= MISSING_LITERAL_PENALTY;
                }
            }
        }
        out.confidence = confidence;

        if out.confidence >= RETENTION_FLOOR {
            merged.push(out);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_core::types::{DetectionMethod, RefAction};

    fn r(issue: i64, commit: &str, action: RefAction, confidence: f64, method: DetectionMethod) -> IssueCommitRef {
        IssueCommitRef {
            repo_id: 1,
            issue_number: issue,
            commit_sha: Some(commit.to_string()),
            pr_number: None,
            action,
            confidence,
            detection_method: method,
            extracted_from: "x".into(),
            evidence: vec!["e".into()],
        }
    }

    #[test]
    fn duplicate_tuple_is_combined_with_additive_boost() {
        let raw = vec![
            r(1, "c1", RefAction::Fixes, 0.80, DetectionMethod::CommitExtraction),
            r(1, "c1", RefAction::AssociatedWith, 0.55, DetectionMethod::Temporal),
        ];
        let merged = merge(raw, |_| None, |_, _| true);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.83).abs() < 1e-9);
        assert_eq!(merged[0].action, RefAction::Fixes);
    }

    #[test]
    fn missing_literal_reference_halves_confidence() {
        let raw = vec![r(127, "c1", RefAction::Fixes, 0.80, DetectionMethod::CommitExtraction)];
        let merged = merge(raw, |_| Some("totally unrelated message".to_string()), |text, n| text.contains(&n.to_string()));
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn refs_below_the_retention_floor_are_dropped() {
        let raw = vec![r(1, "c1", RefAction::Mentions, 0.35, DetectionMethod::Temporal)];
        let merged = merge(raw, |_| None, |_, _| true);
        assert!(merged.is_empty());
    }
}
