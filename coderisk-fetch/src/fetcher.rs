//! `fetch_repo` (spec §4.1 contract): populates
//! `github_repositories`/`github_commits`/`github_pull_requests`/
//! `github_issues`/`github_issue_timeline` with incremental re-entry and
//! per-entity idempotent upserts.
//!
//! Grounded on `daemon::indexer`'s checkpoint-and-resume shape, generalized
//! from a single JSON cursor file to SS's own cursor columns (spec §3
//! "Repository... ingestion cursors").

use chrono::Utc;
use coderisk_core::checkpoint::Stage;
use coderisk_core::store::StagingStore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::Result;
use crate::platform::PlatformClient;
use crate::window::Window;

/// Outcome of a `fetch_repo` run (spec §4.1 output guarantee: "after
/// successful completion, SS contains every commit reachable in the window
/// with non-null patch data").
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchReport {
    pub commits_ingested: usize,
    pub pull_requests_ingested: usize,
    pub issues_ingested: usize,
    pub timeline_events_ingested: usize,
}

/// `hash(sorted(parent_shas))` across every ingested commit — a change
/// invalidates topological ordering (I8) and is compared against the
/// previous run's value by the caller.
fn parent_shas_hash(commits: &[coderisk_core::types::Commit]) -> String {
    let mut all: Vec<&str> = commits.iter().flat_map(|c| c.parent_shas.iter().map(String::as_str)).collect();
    all.sort_unstable();
    let mut hasher = Sha256::new();
    for sha in all {
        hasher.update(sha.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub async fn fetch_repo(
    store: &StagingStore,
    client: &dyn PlatformClient,
    owner: &str,
    name: &str,
    window: Window,
) -> Result<FetchReport> {
    let window = window.validate()?;
    let default_branch = client.default_branch(owner, name).await?;
    let repo_id = store.upsert_repository(owner, name, &default_branch)?;

    let existing = store.get_repository(repo_id)?;
    // Incremental anchor: `since = max(author_date)` already in SS (spec
    // §4.1), or the window's lower bound on first ingestion.
    let commit_since = existing.as_ref().and_then(|r| r.last_commit_time).or_else(|| window.since(Utc::now()));
    let issue_since = existing.as_ref().and_then(|r| r.last_issue_update_time).or_else(|| window.since(Utc::now()));

    let mut report = FetchReport::default();

    // -- Commits ----------------------------------------------------------
    let mut commits = Vec::new();
    let mut page = 1;
    loop {
        let fetched = client.fetch_commits(owner, name, commit_since, page).await?;
        for raw in fetched.items {
            // Already-seen check (spec §4.1): a commit with patch data
            // already in SS doesn't need to be re-fetched/re-upserted.
            if let Some(existing_commit) = store.get_commit(repo_id, &raw.sha)? {
                if !existing_commit.files.is_empty() {
                    continue;
                }
            }
            commits.push(raw);
        }
        match fetched.next_page {
            Some(next) => page = next,
            None => break,
        }
    }

    // Topological index: GitHub returns commits newest-first per page, so
    // the oldest fetched commit gets the lowest index (I7's ascending
    // order is resolved by the atomizer reading this column, not by
    // insertion order here).
    let total = commits.len() as i64;
    let commits_typed: Vec<coderisk_core::types::Commit> = commits
        .into_iter()
        .enumerate()
        .map(|(i, raw)| raw.into_commit(repo_id, total - i as i64))
        .collect();
    for commit in &commits_typed {
        store.upsert_commit(commit)?;
        report.commits_ingested += 1;
    }

    let new_hash = if commits_typed.is_empty() {
        existing.as_ref().and_then(|r| r.parent_shas_hash.clone())
    } else {
        Some(parent_shas_hash(&commits_typed))
    };

    if let (Some(prev), Some(new)) = (existing.as_ref().and_then(|r| r.parent_shas_hash.clone()), new_hash.clone()) {
        if prev != new {
            warn!(owner, name, "parent_shas_hash changed: force-push detected, invalidating affected commits (I8)");
            let shas: Vec<String> = commits_typed.iter().map(|c| c.sha.clone()).collect();
            store.mark_commits_pending(repo_id, &shas)?;
        }
    }

    let newest_commit_time = commits_typed.iter().map(|c| c.author_time).max();
    store.update_repo_cursors(repo_id, newest_commit_time, None, new_hash.as_deref())?;
    if let Some(t) = newest_commit_time {
        store.set_checkpoint(repo_id, Stage::Fetch, &t.to_rfc3339())?;
    }

    // -- Pull requests ------------------------------------------------------
    let mut page = 1;
    loop {
        let fetched = client.fetch_pull_requests(owner, name, issue_since, page).await?;
        for raw in &fetched.items {
            store.upsert_pull_request(&raw.clone().into_pull_request(repo_id))?;
            report.pull_requests_ingested += 1;
        }
        match fetched.next_page {
            Some(next) => page = next,
            None => break,
        }
    }

    // -- Issues + timeline --------------------------------------------------
    let mut page = 1;
    let mut all_issue_numbers = Vec::new();
    loop {
        let fetched = client.fetch_issues(owner, name, issue_since, page).await?;
        for raw in &fetched.items {
            all_issue_numbers.push(raw.number);
            store.upsert_issue(&raw.clone().into_issue(repo_id))?;
            report.issues_ingested += 1;
        }
        match fetched.next_page {
            Some(next) => page = next,
            None => break,
        }
    }

    for issue_number in all_issue_numbers {
        let mut page = 1;
        loop {
            let fetched = client.fetch_issue_timeline(owner, name, issue_number, page).await?;
            for raw in fetched.items {
                store.insert_timeline_event(&raw.into_event(repo_id))?;
                report.timeline_events_ingested += 1;
            }
            match fetched.next_page {
                Some(next) => page = next,
                None => break,
            }
        }
    }

    store.update_repo_cursors(repo_id, None, Some(Utc::now()), None)?;

    info!(
        owner,
        name,
        commits = report.commits_ingested,
        prs = report.pull_requests_ingested,
        issues = report.issues_ingested,
        timeline_events = report.timeline_events_ingested,
        "fetch_repo complete"
    );

    Ok(report)
}
