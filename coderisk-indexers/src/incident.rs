//! Incident Index (spec §4.4): for each fix commit touching a CodeBlock,
//! write a `CodeBlockIncident` with confidence = min(issue-bug-confidence,
//! link-confidence), retaining only rows at or above the 0.70 floor (I4).

use coderisk_core::store::StagingStore;
use coderisk_core::types::CodeBlockIncident;
use tracing::info;

use crate::error::Result;

/// Confidence floor below which an incident is discarded rather than
/// persisted (I4).
const RETENTION_FLOOR: f64 = 0.70;

/// `Issue.is_bug` is a boolean ingestion-time heuristic, not a graded
/// score — we treat it as a bug-confidence of 1.0 when true and skip
/// non-bug issues entirely (they never produce an incident regardless of
/// link confidence).
const BUG_CONFIDENCE: f64 = 1.0;

pub fn run(store: &StagingStore, repo_id: i64) -> Result<usize> {
    let issues = store.list_issues(repo_id)?;
    let mut written = 0;

    for issue in issues.iter().filter(|i| i.is_bug) {
        for link in store.list_refs_for_issue(repo_id, issue.number)? {
            if !link.action.is_fixing() {
                continue;
            }
            let Some(sha) = &link.commit_sha else { continue };
            let confidence = BUG_CONFIDENCE.min(link.confidence);
            if confidence < RETENTION_FLOOR {
                continue;
            }

            let Some(commit) = store.get_commit(repo_id, sha)? else { continue };

            for block_id in store.modifications_in_commit(sha)? {
                store.upsert_incident(&CodeBlockIncident {
                    block_id,
                    issue_number: issue.number,
                    confidence,
                    evidence_source: link.detection_method.as_str().to_string(),
                    fix_commit_sha: sha.clone(),
                    incident_time: commit.author_time,
                    resolution_time: issue.closed_at,
                })?;
                written += 1;
            }
        }
    }

    info!(repo_id, incidents = written, "incident index complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coderisk_core::types::{
        AtomizationState, BlockType, Commit, DetectionMethod, Issue, IssueCommitRef, RefAction,
    };

    fn seed_bug_fix(store: &StagingStore, repo_id: i64, confidence: f64) -> i64 {
        let now = Utc::now();
        store
            .upsert_commit(&Commit {
                repo_id,
                sha: "fix1".into(),
                message: "fix".into(),
                author_name: "dev".into(),
                author_email: "dev@example.com".into(),
                author_time: now,
                topological_index: 1,
                parent_shas: vec![],
                files: vec![],
                atomization_state: AtomizationState::Pending,
                atomized_at: None,
            })
            .unwrap();
        let block_id = store
            .upsert_code_block(
                &coderisk_core::types::CodeBlockKey { repo_id, file_path: "src/auth.rs".into(), block_name: "login".into() },
                BlockType::Function,
                1,
                10,
                "rust",
                None,
                "fix1",
                "dev",
                now,
            )
            .unwrap();
        store
            .upsert_modification(&coderisk_core::types::CodeBlockModification {
                block_id,
                commit_sha: "fix1".into(),
                additions: 1,
                deletions: 1,
                patch_snippet: None,
                kind: coderisk_core::types::ModificationKind::Modified,
            })
            .unwrap();
        store
            .upsert_issue(&Issue {
                repo_id,
                number: 127,
                title: "login broken".into(),
                body: None,
                author: "reporter".into(),
                created_at: now,
                closed_at: Some(now),
                labels: vec!["bug".into()],
                is_bug: true,
            })
            .unwrap();
        store
            .insert_issue_commit_ref(&IssueCommitRef {
                repo_id,
                issue_number: 127,
                commit_sha: Some("fix1".into()),
                pr_number: None,
                action: RefAction::Fixes,
                confidence,
                detection_method: DetectionMethod::CommitExtraction,
                extracted_from: "commit:fix1".into(),
                evidence: vec![],
            })
            .unwrap();
        block_id
    }

    #[test]
    fn fixing_ref_above_floor_produces_an_incident() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widget", "main").unwrap();
        let block_id = seed_bug_fix(&store, repo_id, 0.90);

        let written = run(&store, repo_id).unwrap();
        assert_eq!(written, 1);
        let incidents = store.list_incidents_for_block(block_id, 10).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].confidence, 0.90);
    }

    #[test]
    fn ref_below_retention_floor_is_discarded() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widget", "main").unwrap();
        let block_id = seed_bug_fix(&store, repo_id, 0.50);

        let written = run(&store, repo_id).unwrap();
        assert_eq!(written, 0);
        assert!(store.list_incidents_for_block(block_id, 10).unwrap().is_empty());
    }

    #[test]
    fn mentions_action_is_not_treated_as_a_fix() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widget", "main").unwrap();
        let block_id = seed_bug_fix(&store, repo_id, 0.95);
        // overwrite the ref with a non-fixing action
        store
            .insert_issue_commit_ref(&IssueCommitRef {
                repo_id,
                issue_number: 127,
                commit_sha: Some("fix1".into()),
                pr_number: None,
                action: RefAction::Mentions,
                confidence: 0.95,
                detection_method: DetectionMethod::CommitExtraction,
                extracted_from: "commit:fix1".into(),
                evidence: vec![],
            })
            .unwrap();

        let written = run(&store, repo_id).unwrap();
        // both the Fixes and Mentions rows exist in SS; only the fixing one counts.
        assert_eq!(written, 1);
        let _ = block_id;
    }
}
