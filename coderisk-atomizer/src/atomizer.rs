//! `atomize_commit`/`atomize_pending` (spec §4.2 public operations).

use coderisk_core::checkpoint::Stage;
use coderisk_core::store::StagingStore;
use coderisk_core::types::Commit;
use coderisk_llm::batch::{chunk, with_retry, DEFAULT_BATCH_SIZE};
use coderisk_llm::types::CommitDiffInput;
use coderisk_llm::LlmClient;
use tracing::{info, warn};

use crate::apply::apply_event;
use crate::diff::extract_hunks;
use crate::error::Result;

/// Process one commit end to end: filter its files, submit the surviving
/// hunks to the LLM, validate the response, and apply it.
///
/// A commit whose files are entirely filtered out (step 1) is marked
/// `atomized` with zero events rather than skipped — it has been fully
/// processed, just with nothing to extract.
pub async fn atomize_commit(store: &StagingStore, llm: &dyn LlmClient, commit: &Commit) -> Result<usize> {
    let hunks = extract_hunks(&commit.files);
    if hunks.is_empty() {
        store.mark_commit_atomized(commit.repo_id, &commit.sha)?;
        return Ok(0);
    }

    let input = CommitDiffInput { sha: commit.sha.clone(), message: commit.message.clone(), files: hunks.clone() };
    let submitted_paths: std::collections::HashSet<&str> = hunks.iter().map(|h| h.path.as_str()).collect();

    let result = with_retry("atomize_commit", || llm.extract_change_events(std::slice::from_ref(&input))).await?;

    let events = match result.get(&commit.sha) {
        Some(events) => events,
        None => {
            warn!(sha = %commit.sha, "LLM dropped this commit from its batch response; leaving pending for retry");
            return Ok(0);
        }
    };

    let mut applied = 0;
    for event in events {
        // Critical correctness (spec §4.2): discard any event whose SHA
        // doesn't match the commit it was requested against, even though
        // `result.get` already guarantees the outer key matched — the
        // model may still echo a *different* SHA inside the event body.
        if event.commit_sha != commit.sha {
            warn!(
                expected = %commit.sha,
                got = %event.commit_sha,
                "change event echoed a different commit SHA than requested; discarding"
            );
            continue;
        }
        // Step 4: reject empty block names for block-kind events, and
        // events whose file path wasn't actually in the submitted diff.
        use coderisk_llm::types::ChangeEventKind::*;
        let is_block_event = matches!(event.kind, AddBlock | ModifyBlock | DeleteBlock | RenameBlock);
        if is_block_event && event.block_name.trim().is_empty() {
            warn!(sha = %commit.sha, "dropping block-kind event with empty block_name");
            continue;
        }
        if !submitted_paths.contains(event.file_path.as_str()) {
            warn!(sha = %commit.sha, path = %event.file_path, "dropping event whose file path wasn't in the diff");
            continue;
        }

        apply_event(store, commit.repo_id, &commit.sha, &commit.author_name, &commit.files, event)?;
        applied += 1;
    }

    store.mark_commit_atomized(commit.repo_id, &commit.sha)?;
    Ok(applied)
}

/// Batch driver: pulls pending commits in ascending topological order,
/// invokes the LLM in batches of [`DEFAULT_BATCH_SIZE`], and applies
/// results (spec §4.2 "Concurrency & batching").
pub async fn atomize_pending(store: &StagingStore, llm: &dyn LlmClient, repo_id: i64) -> Result<usize> {
    let pending = store.list_pending_commits(repo_id, usize::MAX)?;
    let mut total_events = 0;

    for batch in chunk(&pending, DEFAULT_BATCH_SIZE) {
        let inputs: Vec<CommitDiffInput> = batch
            .iter()
            .map(|c| CommitDiffInput {
                sha: c.sha.clone(),
                message: c.message.clone(),
                files: extract_hunks(&c.files),
            })
            .collect();

        let result = with_retry("atomize_pending", || llm.extract_change_events(&inputs)).await?;

        for commit in &batch {
            let hunks = extract_hunks(&commit.files);
            if hunks.is_empty() {
                store.mark_commit_atomized(commit.repo_id, &commit.sha)?;
                continue;
            }
            let submitted_paths: std::collections::HashSet<&str> =
                hunks.iter().map(|h| h.path.as_str()).collect();

            match result.get(&commit.sha) {
                Some(events) => {
                    for event in events {
                        if event.commit_sha != commit.sha {
                            continue;
                        }
                        use coderisk_llm::types::ChangeEventKind::*;
                        let is_block_event = matches!(event.kind, AddBlock | ModifyBlock | DeleteBlock | RenameBlock);
                        if is_block_event && event.block_name.trim().is_empty() {
                            continue;
                        }
                        if !submitted_paths.contains(event.file_path.as_str()) {
                            continue;
                        }
                        apply_event(store, commit.repo_id, &commit.sha, &commit.author_name, &commit.files, event)?;
                        total_events += 1;
                    }
                    store.mark_commit_atomized(commit.repo_id, &commit.sha)?;
                }
                None => warn!(sha = %commit.sha, "LLM dropped this commit from its batch response; leaving pending for retry"),
            }
        }
    }

    if let Some(last) = pending.last() {
        store.set_checkpoint(repo_id, Stage::Atomize, &last.sha)?;
    }
    info!(repo_id, events = total_events, commits = pending.len(), "atomize_pending complete");
    Ok(total_events)
}
