//! Step 5-6: apply validated change events to the staging store (spec
//! §4.2).

use chrono::Utc;
use coderisk_core::store::StagingStore;
use coderisk_core::types::{BlockType, CodeBlockKey, CodeBlockModification, FilePatch, ModificationKind};
use coderisk_llm::types::{ChangeEvent, ChangeEventKind};
use tracing::warn;

use crate::error::Result;

fn parse_block_type(s: Option<&str>) -> BlockType {
    match s.unwrap_or("function").to_lowercase().as_str() {
        "method" => BlockType::Method,
        "class" => BlockType::Class,
        "component" => BlockType::Component,
        _ => BlockType::Function,
    }
}

/// The file-level additions/deletions/patch text to attribute to a block
/// touched within it (spec §4.2 step 6) — the atomizer parses block
/// boundaries from the diff but not a per-block addition/deletion split, so
/// every block modified by a file's commit carries that file's figures.
struct FileStats<'a> {
    additions: u32,
    deletions: u32,
    patch_snippet: Option<&'a str>,
}

fn file_stats<'a>(files: &'a [FilePatch], path: &str) -> FileStats<'a> {
    match files.iter().find(|f| f.path == path) {
        Some(f) => FileStats { additions: f.additions, deletions: f.deletions, patch_snippet: f.patch.as_deref() },
        None => FileStats { additions: 0, deletions: 0, patch_snippet: None },
    }
}

/// Apply one validated change event, returning the modification it wrote
/// (when the event resulted in a block touch, as opposed to an import-only
/// event which has no `code_blocks` row to attach to). `files` is the
/// commit's per-file patch payload, consulted for the additions/deletions/
/// patch snippet to attribute to the touched block.
pub fn apply_event(
    store: &StagingStore,
    repo_id: i64,
    commit_sha: &str,
    author: &str,
    files: &[FilePatch],
    event: &ChangeEvent,
) -> Result<()> {
    let stats = file_stats(files, &event.file_path);
    match event.kind {
        ChangeEventKind::AddBlock | ChangeEventKind::ModifyBlock => {
            let key = CodeBlockKey {
                repo_id,
                file_path: event.file_path.clone(),
                block_name: event.block_name.clone(),
            };
            if event.kind == ChangeEventKind::ModifyBlock && store.get_code_block_by_key(&key)?.is_none() {
                warn!(
                    commit_sha,
                    file = %event.file_path,
                    block = %event.block_name,
                    "MODIFY_BLOCK on a block with no prior history; creating it (history is incomplete, not corrupt)"
                );
            }
            let block_id = store.upsert_code_block(
                &key,
                parse_block_type(event.block_type.as_deref()),
                event.start_line.unwrap_or(0),
                event.end_line.unwrap_or(0),
                "unknown",
                None,
                commit_sha,
                author,
                Utc::now(),
            )?;
            let kind = if event.kind == ChangeEventKind::AddBlock {
                ModificationKind::Created
            } else {
                ModificationKind::Modified
            };
            store.upsert_modification(&CodeBlockModification {
                block_id,
                commit_sha: commit_sha.to_string(),
                additions: stats.additions,
                deletions: stats.deletions,
                patch_snippet: stats.patch_snippet.map(str::to_string),
                kind,
            })?;
        }
        ChangeEventKind::DeleteBlock => {
            let key = CodeBlockKey {
                repo_id,
                file_path: event.file_path.clone(),
                block_name: event.block_name.clone(),
            };
            match store.get_code_block_by_key(&key)? {
                Some(block) => {
                    store.upsert_modification(&CodeBlockModification {
                        block_id: block.id,
                        commit_sha: commit_sha.to_string(),
                        additions: stats.additions,
                        deletions: stats.deletions,
                        patch_snippet: stats.patch_snippet.map(str::to_string),
                        kind: ModificationKind::Deleted,
                    })?;
                }
                None => warn!(
                    commit_sha,
                    file = %event.file_path,
                    block = %event.block_name,
                    "DELETE_BLOCK on a block with no prior history; ignoring"
                ),
            }
        }
        ChangeEventKind::RenameBlock => {
            let previous_name = event.previous_block_name.as_deref().unwrap_or(&event.block_name);
            let old_key = CodeBlockKey {
                repo_id,
                file_path: event.file_path.clone(),
                block_name: previous_name.to_string(),
            };
            match store.get_code_block_by_key(&old_key)? {
                Some(block) if previous_name != event.block_name => {
                    store.rename_code_block_name(block.id, &event.block_name)?;
                    store.upsert_modification(&CodeBlockModification {
                        block_id: block.id,
                        commit_sha: commit_sha.to_string(),
                        additions: stats.additions,
                        deletions: stats.deletions,
                        patch_snippet: stats.patch_snippet.map(str::to_string),
                        kind: ModificationKind::Renamed,
                    })?;
                }
                _ => {
                    warn!(
                        commit_sha,
                        file = %event.file_path,
                        block = %event.block_name,
                        "RENAME_BLOCK could not find the prior identity; creating a fresh block instead"
                    );
                    let key = CodeBlockKey {
                        repo_id,
                        file_path: event.file_path.clone(),
                        block_name: event.block_name.clone(),
                    };
                    let block_id = store.upsert_code_block(
                        &key,
                        parse_block_type(event.block_type.as_deref()),
                        event.start_line.unwrap_or(0),
                        event.end_line.unwrap_or(0),
                        "unknown",
                        None,
                        commit_sha,
                        author,
                        Utc::now(),
                    )?;
                    store.upsert_modification(&CodeBlockModification {
                        block_id,
                        commit_sha: commit_sha.to_string(),
                        additions: stats.additions,
                        deletions: stats.deletions,
                        patch_snippet: stats.patch_snippet.map(str::to_string),
                        kind: ModificationKind::Renamed,
                    })?;
                }
            }
        }
        // Import events carry dependency metadata rather than a block
        // touch; coderisk-graph projects `DEPENDS_ON` edges directly off
        // `code_block_modifications`' commit/file linkage, so nothing
        // further is written here beyond what step 6 already recorded.
        ChangeEventKind::AddImport | ChangeEventKind::RemoveImport => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ChangeEventKind, block_name: &str) -> ChangeEvent {
        ChangeEvent {
            commit_sha: "c1".into(),
            kind,
            file_path: "src/auth.rs".into(),
            block_name: block_name.into(),
            block_type: Some("function".into()),
            start_line: Some(10),
            end_line: Some(20),
            dependency_path: None,
            previous_block_name: None,
        }
    }

    #[test]
    fn add_block_creates_a_code_block_row() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        apply_event(&store, repo_id, "c1", "alice", &[], &event(ChangeEventKind::AddBlock, "login")).unwrap();

        let key = CodeBlockKey { repo_id, file_path: "src/auth.rs".into(), block_name: "login".into() };
        assert!(store.get_code_block_by_key(&key).unwrap().is_some());
    }

    #[test]
    fn delete_block_on_unknown_block_is_a_no_op_not_an_error() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        apply_event(&store, repo_id, "c1", "alice", &[], &event(ChangeEventKind::DeleteBlock, "ghost")).unwrap();
    }

    #[test]
    fn rename_block_preserves_identity_when_prior_block_exists() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        apply_event(&store, repo_id, "c1", "alice", &[], &event(ChangeEventKind::AddBlock, "old_name")).unwrap();

        let old_key = CodeBlockKey { repo_id, file_path: "src/auth.rs".into(), block_name: "old_name".into() };
        let original_id = store.get_code_block_by_key(&old_key).unwrap().unwrap().id;

        let mut rename = event(ChangeEventKind::RenameBlock, "new_name");
        rename.previous_block_name = Some("old_name".into());
        apply_event(&store, repo_id, "c2", "alice", &[], &rename).unwrap();

        let new_key = CodeBlockKey { repo_id, file_path: "src/auth.rs".into(), block_name: "new_name".into() };
        let renamed = store.get_code_block_by_key(&new_key).unwrap().unwrap();
        assert_eq!(renamed.id, original_id);
        assert!(store.get_code_block_by_key(&old_key).unwrap().is_none());
    }

    #[test]
    fn modification_carries_the_touched_files_additions_deletions_and_patch() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        let files = vec![coderisk_core::types::FilePatch {
            path: "src/auth.rs".into(),
            additions: 12,
            deletions: 4,
            patch: Some("@@ -1,4 +1,12 @@\n+fn login() {}\n".into()),
            status: coderisk_core::types::FileChangeStatus::Modified,
        }];
        apply_event(&store, repo_id, "c1", "alice", &files, &event(ChangeEventKind::AddBlock, "login")).unwrap();

        let key = CodeBlockKey { repo_id, file_path: "src/auth.rs".into(), block_name: "login".into() };
        let block_id = store.get_code_block_by_key(&key).unwrap().unwrap().id;
        let modification = store
            .list_modifications_for_block(block_id)
            .unwrap()
            .into_iter()
            .find(|m| m.commit_sha == "c1")
            .unwrap();
        assert_eq!(modification.additions, 12);
        assert_eq!(modification.deletions, 4);
        assert_eq!(modification.patch_snippet.as_deref(), Some("@@ -1,4 +1,12 @@\n+fn login() {}\n"));
    }
}
