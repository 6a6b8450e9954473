//! Ownership / Familiarity pass (spec §4.4): per `(block, developer)`,
//! derive edit count, last edit time, and contribution share from
//! `CodeBlockModification` rows, then bucket into a familiarity tier.

use std::collections::HashMap;

use coderisk_core::store::StagingStore;
use coderisk_core::types::{FamiliarityTier, Ownership};
use tracing::info;

use crate::error::Result;

struct DevStats {
    edit_count: u32,
    last_edit_time: chrono::DateTime<chrono::Utc>,
}

pub fn run(store: &StagingStore, repo_id: i64) -> Result<usize> {
    let commits_by_sha: HashMap<String, coderisk_core::types::Commit> =
        store.list_commits(repo_id)?.into_iter().map(|c| (c.sha.clone(), c)).collect();

    let mut written = 0;
    for block in store.list_code_blocks(repo_id)? {
        let mods = store.list_modifications_for_block(block.id)?;
        let total = mods.len() as f64;
        if total == 0.0 {
            continue;
        }

        let mut by_dev: HashMap<String, DevStats> = HashMap::new();
        for m in &mods {
            let Some(commit) = commits_by_sha.get(&m.commit_sha) else { continue };
            let entry = by_dev.entry(commit.author_name.clone()).or_insert(DevStats {
                edit_count: 0,
                last_edit_time: commit.author_time,
            });
            entry.edit_count += 1;
            if commit.author_time > entry.last_edit_time {
                entry.last_edit_time = commit.author_time;
            }
        }

        for (developer, stats) in by_dev {
            let share = stats.edit_count as f64 / total;
            store.upsert_ownership(&Ownership {
                block_id: block.id,
                developer,
                edit_count: stats.edit_count,
                last_edit_time: stats.last_edit_time,
                contribution_share: share,
                familiarity: FamiliarityTier::from_share(share),
            })?;
            written += 1;
        }
    }

    info!(repo_id, rows = written, "ownership/familiarity index complete");
    Ok(written)
}
