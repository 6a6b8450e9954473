//! `link_repo` (spec §4.3): runs P1/P2/P3, merges, validates, and writes
//! the resulting confidence-scored refs.

use std::collections::HashMap;

use coderisk_core::checkpoint::Stage;
use coderisk_core::store::StagingStore;
use coderisk_core::types::DetectionMethod;
use coderisk_llm::LlmClient;
use tracing::info;

use crate::error::Result;
use crate::{merge, p1, p2, p3, refs};

/// Refs at or above this confidence are treated as "high-confidence
/// explicit links" (spec §4.3 P2: issues with these are excluded from
/// temporal correlation).
const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.70;

pub async fn link_repo(store: &StagingStore, llm: &dyn LlmClient, repo_id: i64) -> Result<usize> {
    let commits = store.list_commits(repo_id)?;
    let pull_requests = store.list_pull_requests(repo_id)?;
    let issues = store.list_issues(repo_id)?;

    // -- P1 --------------------------------------------------------------
    let mut sources: Vec<p1::Source> = commits
        .iter()
        .map(|c| p1::Source {
            natural_key: format!("commit:{}", c.sha),
            text: c.message.clone(),
            commit_sha: Some(c.sha.clone()),
            pr_number: None,
            method: DetectionMethod::CommitExtraction,
        })
        .collect();
    sources.extend(pull_requests.iter().filter_map(|pr| {
        pr.body.as_ref().map(|body| p1::Source {
            natural_key: format!("pr:{}", pr.number),
            text: body.clone(),
            commit_sha: None,
            pr_number: Some(pr.number),
            method: DetectionMethod::PrExtraction,
        })
    }));

    let mut all_refs = p1::extract(repo_id, llm, &sources).await?;

    let mut high_confidence_issues: std::collections::HashSet<i64> = std::collections::HashSet::new();
    for r in &all_refs {
        if r.confidence >= HIGH_CONFIDENCE_THRESHOLD {
            high_confidence_issues.insert(r.issue_number);
        }
    }

    // -- P2 ----------------------------------------------------------------
    let p2_refs = p2::correlate(repo_id, &issues, &pull_requests, &commits, |n| high_confidence_issues.contains(&n));
    all_refs.extend(p2_refs);

    // -- P3 ------------------------------------------------------------
    for issue in &issues {
        let timeline = store.list_timeline_events(repo_id, issue.number)?;
        if timeline.is_empty() {
            continue;
        }
        p3::verify(repo_id, issue.number, &timeline, &mut all_refs);
    }

    // -- Merge & filter --------------------------------------------------
    let commit_text: HashMap<String, String> =
        commits.iter().map(|c| (c.sha.clone(), c.message.clone())).collect();
    let pr_text: HashMap<i64, String> =
        pull_requests.iter().filter_map(|pr| pr.body.as_ref().map(|b| (pr.number, b.clone()))).collect();

    let merged = merge::merge(
        all_refs,
        |r| {
            r.commit_sha
                .as_ref()
                .and_then(|sha| commit_text.get(sha).cloned())
                .or_else(|| r.pr_number.and_then(|n| pr_text.get(&n).cloned()))
        },
        refs::contains_reference,
    );

    // Entity resolution (spec §4.3): drop refs whose target number
    // resolves to neither an Issue nor a PullRequest in SS — the edge
    // has no valid endpoint to attach to.
    let resolved: Vec<_> = merged
        .into_iter()
        .filter(|r| matches!(store.resolve_entity(repo_id, r.issue_number), Ok(Some(_))))
        .collect();

    let count = resolved.len();
    store.replace_merged_refs(repo_id, &resolved)?;
    store.set_checkpoint(repo_id, Stage::Link, &count.to_string())?;
    info!(repo_id, refs = count, "link_repo complete");
    Ok(count)
}
