//! Stage checkpointing (spec §4.7 "writes a checkpoint... may be re-entered
//! safely"; SPEC_FULL.md §F).
//!
//! Grounded on the teacher's `index_state.json` incremental-resume pattern
//! (`daemon::indexer::IndexState`), translated into a SQL table keyed
//! `(repo_id, stage)` since SS is already this pipeline's source of truth —
//! there is no separate JSON state file to keep in sync.

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::store::StagingStore;

/// The five orchestrator stages that checkpoint their progress (spec §4.7,
/// §2's PF -> CA -> IL -> RI -> GP sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Atomize,
    Link,
    Index,
    Project,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Atomize => "atomize",
            Stage::Link => "link",
            Stage::Index => "index",
            Stage::Project => "project",
        }
    }
}

impl StagingStore {
    /// Record the cursor a stage last processed up to — an opaque string
    /// (a commit SHA, an ISO timestamp, a page token) whose meaning is
    /// defined by the stage itself.
    pub fn set_checkpoint(&self, repo_id: i64, stage: Stage, cursor: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (repo_id, stage, cursor, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(repo_id, stage) DO UPDATE SET
                    cursor = excluded.cursor, updated_at = excluded.updated_at",
                params![repo_id, stage.as_str(), cursor, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn get_checkpoint(&self, repo_id: i64, stage: Stage) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT cursor FROM checkpoints WHERE repo_id = ?1 AND stage = ?2",
                params![repo_id, stage.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips_and_re_entry_reads_last_cursor() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();

        assert_eq!(store.get_checkpoint(repo_id, Stage::Atomize).unwrap(), None);

        store.set_checkpoint(repo_id, Stage::Atomize, "c1").unwrap();
        assert_eq!(store.get_checkpoint(repo_id, Stage::Atomize).unwrap(), Some("c1".to_string()));

        // Re-entry after a later run updates the same row rather than
        // accumulating a history (§4.7 "may be re-entered safely").
        store.set_checkpoint(repo_id, Stage::Atomize, "c2").unwrap();
        assert_eq!(store.get_checkpoint(repo_id, Stage::Atomize).unwrap(), Some("c2".to_string()));
    }

    #[test]
    fn stages_checkpoint_independently() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        store.set_checkpoint(repo_id, Stage::Fetch, "2026-01-01T00:00:00Z").unwrap();
        store.set_checkpoint(repo_id, Stage::Link, "issue:42").unwrap();

        assert_eq!(
            store.get_checkpoint(repo_id, Stage::Fetch).unwrap(),
            Some("2026-01-01T00:00:00Z".to_string())
        );
        assert_eq!(store.get_checkpoint(repo_id, Stage::Link).unwrap(), Some("issue:42".to_string()));
        assert_eq!(store.get_checkpoint(repo_id, Stage::Index).unwrap(), None);
    }
}
