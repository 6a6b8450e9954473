//! Coupling pass (spec §4.4): for each pair of blocks modified in the same
//! commit, increment a co-change counter; after the full pass, persist
//! pairs meeting the retention threshold with `rate = count / min(mods(a),
//! mods(b))` (T7: always `block_a_id < block_b_id`).

use std::collections::HashMap;

use coderisk_core::store::StagingStore;
use coderisk_core::types::CodeBlockCoupling;
use tracing::info;

use crate::error::Result;

const MIN_RATE: f64 = 0.30;
const MIN_COUNT: u32 = 3;

struct Accumulator {
    count: u32,
    first: chrono::DateTime<chrono::Utc>,
    last: chrono::DateTime<chrono::Utc>,
}

pub fn run(store: &StagingStore, repo_id: i64) -> Result<usize> {
    let commits = store.list_commits(repo_id)?;
    let mut pairs: HashMap<(i64, i64), Accumulator> = HashMap::new();

    for commit in &commits {
        let mut blocks = store.modifications_in_commit(&commit.sha)?;
        blocks.sort_unstable();
        blocks.dedup();

        for i in 0..blocks.len() {
            for j in (i + 1)..blocks.len() {
                let (a, b) = (blocks[i], blocks[j]);
                let key = if a < b { (a, b) } else { (b, a) };
                let entry = pairs.entry(key).or_insert(Accumulator {
                    count: 0,
                    first: commit.author_time,
                    last: commit.author_time,
                });
                entry.count += 1;
                entry.first = entry.first.min(commit.author_time);
                entry.last = entry.last.max(commit.author_time);
            }
        }
    }

    let mut mod_count_cache: HashMap<i64, u32> = HashMap::new();
    let mut mods_of = |store: &StagingStore, block_id: i64| -> Result<u32> {
        if let Some(n) = mod_count_cache.get(&block_id) {
            return Ok(*n);
        }
        let n = store.count_modifications_for_block(block_id)?;
        mod_count_cache.insert(block_id, n);
        Ok(n)
    };

    let mut written = 0;
    for ((a, b), acc) in pairs {
        let mods_a = mods_of(store, a)?;
        let mods_b = mods_of(store, b)?;
        let denom = mods_a.min(mods_b);
        if denom == 0 {
            continue;
        }
        let rate = acc.count as f64 / denom as f64;
        if rate >= MIN_RATE || acc.count >= MIN_COUNT {
            store.upsert_coupling(&CodeBlockCoupling::ordered(a, b, acc.count, rate, acc.first, acc.last))?;
            written += 1;
        }
    }

    info!(repo_id, pairs = written, "coupling index complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coderisk_core::types::{
        AtomizationState, BlockType, Commit, CodeBlockKey, CodeBlockModification, FileChangeStatus,
        FilePatch, ModificationKind,
    };

    fn seed(
        store: &StagingStore,
        repo_id: i64,
        block_a: i64,
        block_b_count: i64,
    ) -> (i64, i64) {
        let now = Utc::now();
        let key_x = CodeBlockKey { repo_id, file_path: "src/a.rs".to_string(), block_name: "x".to_string() };
        let key_y = CodeBlockKey { repo_id, file_path: "src/b.rs".to_string(), block_name: "y".to_string() };
        let block_x = store.upsert_code_block(&key_x, BlockType::Function, 1, 2, "rust", None, "c0", "dev", now).unwrap();
        let block_y = store.upsert_code_block(&key_y, BlockType::Function, 1, 2, "rust", None, "c0", "dev", now).unwrap();
        let _ = (block_a, block_b_count);
        (block_x, block_y)
    }

    /// S5: X has 6 total modifications, Y has 8; modified together 6 times
    /// -> `co_change_count = 6`, `coupling_rate ~= 1.0` (6/min(6,8)).
    #[test]
    fn coupling_threshold_matches_s5() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        let (block_x, block_y) = seed(&store, 0, 0);

        for i in 0..8 {
            let sha = format!("c{i}");
            store
                .upsert_commit(&Commit {
                    repo_id,
                    sha: sha.clone(),
                    message: "edit".to_string(),
                    author_name: "dev".to_string(),
                    author_email: "dev@example.com".to_string(),
                    author_time: Utc::now(),
                    topological_index: i + 1,
                    parent_shas: vec![],
                    files: vec![FilePatch {
                        path: "src/a.rs".to_string(),
                        additions: 1,
                        deletions: 0,
                        patch: None,
                        status: FileChangeStatus::Modified,
                    }],
                    atomization_state: AtomizationState::Atomized,
                    atomized_at: None,
                })
                .unwrap();

            // Y is only touched in the first 6 commits; X is touched in all 8.
            store
                .upsert_modification(&CodeBlockModification {
                    block_id: block_x,
                    commit_sha: sha.clone(),
                    additions: 1,
                    deletions: 0,
                    patch_snippet: None,
                    kind: ModificationKind::Modified,
                })
                .unwrap();
            if i < 6 {
                store
                    .upsert_modification(&CodeBlockModification {
                        block_id: block_y,
                        commit_sha: sha,
                        additions: 1,
                        deletions: 0,
                        patch_snippet: None,
                        kind: ModificationKind::Modified,
                    })
                    .unwrap();
            }
        }

        let written = run(&store, repo_id).unwrap();
        assert_eq!(written, 1);

        let coupled = store.list_coupled_blocks(block_x, 10).unwrap();
        assert_eq!(coupled.len(), 1);
        assert_eq!(coupled[0].co_change_count, 6);
        assert!((coupled[0].coupling_rate - 1.0).abs() < 1e-9);
        assert!(coupled[0].block_a_id < coupled[0].block_b_id);
    }

    #[test]
    fn pairs_below_threshold_are_not_persisted() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        let (block_x, block_y) = seed(&store, 0, 0);

        // Co-changed once out of 10 modifications each: rate 0.1, count 1.
        for i in 0..10 {
            let sha = format!("c{i}");
            store
                .upsert_commit(&Commit {
                    repo_id,
                    sha: sha.clone(),
                    message: "edit".to_string(),
                    author_name: "dev".to_string(),
                    author_email: "dev@example.com".to_string(),
                    author_time: Utc::now(),
                    topological_index: i + 1,
                    parent_shas: vec![],
                    files: vec![],
                    atomization_state: AtomizationState::Atomized,
                    atomized_at: None,
                })
                .unwrap();
            store
                .upsert_modification(&CodeBlockModification {
                    block_id: block_x,
                    commit_sha: sha.clone(),
                    additions: 1,
                    deletions: 0,
                    patch_snippet: None,
                    kind: ModificationKind::Modified,
                })
                .unwrap();
            if i == 0 {
                store
                    .upsert_modification(&CodeBlockModification {
                        block_id: block_y,
                        commit_sha: sha,
                        additions: 1,
                        deletions: 0,
                        patch_snippet: None,
                        kind: ModificationKind::Modified,
                    })
                    .unwrap();
            } else {
                // Give Y plenty of its own unrelated modifications so the
                // rate stays low from its side too.
                let other_sha = format!("y-only-{i}");
                store
                    .upsert_commit(&Commit {
                        repo_id,
                        sha: other_sha.clone(),
                        message: "edit".to_string(),
                        author_name: "dev".to_string(),
                        author_email: "dev@example.com".to_string(),
                        author_time: Utc::now(),
                        topological_index: 100 + i,
                        parent_shas: vec![],
                        files: vec![],
                        atomization_state: AtomizationState::Atomized,
                        atomized_at: None,
                    })
                    .unwrap();
                store
                    .upsert_modification(&CodeBlockModification {
                        block_id: block_y,
                        commit_sha: other_sha,
                        additions: 1,
                        deletions: 0,
                        patch_snippet: None,
                        kind: ModificationKind::Modified,
                    })
                    .unwrap();
            }
        }

        assert_eq!(run(&store, repo_id).unwrap(), 0);
        assert!(store.list_coupled_blocks(block_x, 10).unwrap().is_empty());
    }
}
