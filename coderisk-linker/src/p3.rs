//! P3: bidirectional timeline verification (spec §4.3). Reads
//! `cross-referenced`/`closed` timeline events to validate existing refs or
//! create new ones; a ref corroborated on both sides gets a confidence
//! boost.

use coderisk_core::types::{
    DetectionMethod, IssueCommitRef, RefAction, SourceRef, TimelineEvent, TimelineEventKind,
};

const BOOST: f64 = 0.10;
const CONFIDENCE_CAP: f64 = 0.98;

/// Boosts `refs` that are corroborated by a matching timeline event, and
/// appends fresh timeline-sourced refs for events with no existing
/// counterpart.
pub fn verify(repo_id: i64, issue_number: i64, timeline: &[TimelineEvent], refs: &mut Vec<IssueCommitRef>) {
    for event in timeline {
        if !matches!(event.kind, TimelineEventKind::Closed | TimelineEventKind::CrossReferenced) {
            continue;
        }
        let Some(source) = &event.source_ref else { continue };

        let matching_commit_sha = match source {
            SourceRef::Commit { sha } => Some(sha.clone()),
            SourceRef::Number { .. } => None,
        };
        let matching_pr_number = match source {
            SourceRef::Number { number } => Some(*number),
            SourceRef::Commit { .. } => None,
        };

        let mut corroborated = false;
        for r in refs.iter_mut() {
            if r.issue_number != issue_number {
                continue;
            }
            let same_commit = matching_commit_sha.is_some() && r.commit_sha == matching_commit_sha;
            let same_pr = matching_pr_number.is_some() && r.pr_number == matching_pr_number;
            if same_commit || same_pr {
                r.confidence = (r.confidence + BOOST).min(CONFIDENCE_CAP);
                r.evidence.push(format!("corroborated by timeline event at {}", event.timestamp));
                corroborated = true;
            }
        }

        if !corroborated {
            refs.push(IssueCommitRef {
                repo_id,
                issue_number,
                commit_sha: matching_commit_sha,
                pr_number: matching_pr_number,
                action: RefAction::AssociatedWith,
                confidence: 0.55,
                detection_method: DetectionMethod::Timeline,
                extracted_from: format!("timeline:{}", event.kind.as_str()),
                evidence: vec![format!("timeline event at {}", event.timestamp)],
            });
        }
    }
}
