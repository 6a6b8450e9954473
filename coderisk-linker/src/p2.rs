//! P2: temporal correlation (spec §4.3). Grounded on
//! `core::pr_correlation::correlate_events_to_pr`'s confidence-tier
//! structure, generalized from event-to-commit correlation to
//! issue-to-PR/commit correlation over a window rather than a fixed
//! 5-minute bucket.

use chrono::{DateTime, Duration, Utc};
use coderisk_core::types::{Commit, DetectionMethod, Issue, IssueCommitRef, PullRequest, RefAction};

/// Confidence tiers by elapsed time (spec §4.3 P2). The evidence tag names
/// the tier itself (spec §8 S2: a ≤5-minute match's evidence must include
/// the literal "temporal_match_5min").
fn confidence_for_gap(gap: Duration) -> Option<(f64, &'static str)> {
    let secs = gap.num_seconds().abs();
    if secs <= 300 {
        Some((0.80, "temporal_match_5min"))
    } else if secs <= 3_600 {
        Some((0.70, "temporal_match_1hour"))
    } else if secs <= 86_400 {
        Some((0.55, "temporal_match_24hour"))
    } else if secs <= 7 * 86_400 {
        Some((0.50, "temporal_match_7day"))
    } else {
        None
    }
}

/// For each closed issue without a high-confidence explicit link already,
/// correlate against PRs merged and commits authored within ±7 days of the
/// issue's close time.
pub fn correlate(
    repo_id: i64,
    issues: &[Issue],
    pull_requests: &[PullRequest],
    commits: &[Commit],
    already_high_confidence: impl Fn(i64) -> bool,
) -> Vec<IssueCommitRef> {
    let mut refs = Vec::new();

    for issue in issues {
        let Some(closed_at) = issue.closed_at else { continue };
        if already_high_confidence(issue.number) {
            continue;
        }

        for pr in pull_requests {
            let Some(merged_at) = pr.merged_at else { continue };
            if let Some((confidence, tag)) = confidence_for_gap(gap(closed_at, merged_at)) {
                refs.push(temporal_ref(repo_id, issue.number, None, Some(pr.number), confidence, tag));
            }
        }

        for commit in commits {
            if let Some((confidence, tag)) = confidence_for_gap(gap(closed_at, commit.author_time)) {
                refs.push(temporal_ref(repo_id, issue.number, Some(commit.sha.clone()), None, confidence, tag));
            }
        }
    }

    refs
}

fn gap(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    a - b
}

fn temporal_ref(
    repo_id: i64,
    issue_number: i64,
    commit_sha: Option<String>,
    pr_number: Option<i64>,
    confidence: f64,
    evidence_tag: &'static str,
) -> IssueCommitRef {
    IssueCommitRef {
        repo_id,
        issue_number,
        commit_sha,
        pr_number,
        action: RefAction::AssociatedWith,
        confidence,
        detection_method: DetectionMethod::Temporal,
        extracted_from: "temporal_correlation".to_string(),
        evidence: vec![evidence_tag.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(number: i64, closed_at: DateTime<Utc>) -> Issue {
        Issue {
            repo_id: 1,
            number,
            title: "bug".into(),
            body: None,
            author: "dev".into(),
            created_at: closed_at - Duration::days(1),
            closed_at: Some(closed_at),
            labels: vec![],
            is_bug: true,
        }
    }

    #[test]
    fn commit_within_five_minutes_gets_high_confidence() {
        let now = Utc::now();
        let issues = vec![issue(1, now)];
        let commits = vec![Commit {
            repo_id: 1,
            sha: "c1".into(),
            message: "fix".into(),
            author_name: "dev".into(),
            author_email: "dev@example.com".into(),
            author_time: now - Duration::minutes(3),
            topological_index: 1,
            parent_shas: vec![],
            files: vec![],
            atomization_state: coderisk_core::types::AtomizationState::Pending,
            atomized_at: None,
        }];

        let refs = correlate(1, &issues, &[], &commits, |_| false);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].confidence, 0.80);
        assert!(refs[0].evidence.iter().any(|e| e == "temporal_match_5min"));
    }

    /// S2: Issue #221 closed at T, PR #222 merged at T - 48s, no explicit
    /// mention -> temporal, confidence 0.80, evidence includes
    /// "temporal_match_5min".
    #[test]
    fn pr_merged_48s_before_close_matches_s2() {
        let now = Utc::now();
        let issues = vec![issue(221, now)];
        let pr = PullRequest {
            repo_id: 1,
            number: 222,
            title: "fix".into(),
            body: None,
            author: "dev".into(),
            created_at: now - Duration::days(1),
            closed_at: Some(now - Duration::seconds(48)),
            merged_at: Some(now - Duration::seconds(48)),
            merge_commit_sha: Some("m1".into()),
            base_ref: "main".into(),
            head_ref: "fix-221".into(),
        };

        let refs = correlate(1, &issues, &[pr], &[], |_| false);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].issue_number, 221);
        assert_eq!(refs[0].pr_number, Some(222));
        assert_eq!(refs[0].confidence, 0.80);
        assert_eq!(refs[0].detection_method, DetectionMethod::Temporal);
        assert!(refs[0].evidence.iter().any(|e| e == "temporal_match_5min"));
    }

    #[test]
    fn gap_beyond_seven_days_produces_no_ref() {
        let now = Utc::now();
        let issues = vec![issue(1, now)];
        let commits = vec![Commit {
            repo_id: 1,
            sha: "c1".into(),
            message: "fix".into(),
            author_name: "dev".into(),
            author_email: "dev@example.com".into(),
            author_time: now - Duration::days(30),
            topological_index: 1,
            parent_shas: vec![],
            files: vec![],
            atomization_state: coderisk_core::types::AtomizationState::Pending,
            atomized_at: None,
        }];

        assert!(correlate(1, &issues, &[], &commits, |_| false).is_empty());
    }

    #[test]
    fn issues_with_high_confidence_links_already_are_skipped() {
        let now = Utc::now();
        let issues = vec![issue(1, now)];
        let commits = vec![Commit {
            repo_id: 1,
            sha: "c1".into(),
            message: "fix".into(),
            author_name: "dev".into(),
            author_email: "dev@example.com".into(),
            author_time: now,
            topological_index: 1,
            parent_shas: vec![],
            files: vec![],
            atomization_state: coderisk_core::types::AtomizationState::Pending,
            atomized_at: None,
        }];

        assert!(correlate(1, &issues, &[], &commits, |_| true).is_empty());
    }
}
