//! Staging-store access layer (spec §6). All writes are MERGE/UPSERT on
//! natural keys (spec §3 "Lifecycle"); `StagingStore` is the sole owner of
//! the SQLite connection and is safe to share behind an `Arc` across the
//! worker pool described in spec §5 — callers never see a raw `Connection`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{CoderiskError, Result};
use crate::schema;
use crate::types::*;

#[derive(Clone)]
pub struct StagingStore {
    conn: Arc<Mutex<Connection>>,
}

impl StagingStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    // -- Repository ---------------------------------------------------

    pub fn upsert_repository(&self, owner: &str, name: &str, default_branch: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO github_repositories (owner, name, default_branch)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(owner, name) DO UPDATE SET default_branch = excluded.default_branch",
            params![owner, name, default_branch],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM github_repositories WHERE owner = ?1 AND name = ?2",
            params![owner, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_repository(&self, repo_id: i64) -> Result<Option<Repository>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, owner, name, default_branch, last_commit_time, last_issue_update_time, parent_shas_hash
             FROM github_repositories WHERE id = ?1",
            params![repo_id],
            |row| {
                Ok(Repository {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    name: row.get(2)?,
                    default_branch: row.get(3)?,
                    last_commit_time: parse_dt(row.get::<_, Option<String>>(4)?),
                    last_issue_update_time: parse_dt(row.get::<_, Option<String>>(5)?),
                    parent_shas_hash: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    pub fn update_repo_cursors(
        &self,
        repo_id: i64,
        last_commit_time: Option<chrono::DateTime<chrono::Utc>>,
        last_issue_update_time: Option<chrono::DateTime<chrono::Utc>>,
        parent_shas_hash: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE github_repositories
             SET last_commit_time = COALESCE(?1, last_commit_time),
                 last_issue_update_time = COALESCE(?2, last_issue_update_time),
                 parent_shas_hash = COALESCE(?3, parent_shas_hash)
             WHERE id = ?4",
            params![
                last_commit_time.map(|t| t.to_rfc3339()),
                last_issue_update_time.map(|t| t.to_rfc3339()),
                parent_shas_hash,
                repo_id
            ],
        )?;
        Ok(())
    }

    // -- Commits --------------------------------------------------------

    pub fn upsert_commit(&self, commit: &Commit) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let files_json = serde_json::to_string(&commit.files)?;
        let parents_json = serde_json::to_string(&commit.parent_shas)?;
        conn.execute(
            "INSERT INTO github_commits
                (repo_id, sha, message, author_name, author_email, author_time,
                 topological_index, parent_shas, files_json, atomization_state, atomized_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(repo_id, sha) DO UPDATE SET
                message = excluded.message,
                topological_index = excluded.topological_index,
                files_json = excluded.files_json",
            params![
                commit.repo_id,
                commit.sha,
                commit.message,
                commit.author_name,
                commit.author_email,
                commit.author_time.to_rfc3339(),
                commit.topological_index,
                parents_json,
                files_json,
                commit.atomization_state.as_str(),
                commit.atomized_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn mark_commit_atomized(&self, repo_id: i64, sha: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE github_commits SET atomization_state = 'atomized', atomized_at = ?1
             WHERE repo_id = ?2 AND sha = ?3",
            params![chrono::Utc::now().to_rfc3339(), repo_id, sha],
        )?;
        Ok(())
    }

    pub fn mark_commit_skipped(&self, repo_id: i64, sha: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE github_commits SET atomization_state = 'skipped' WHERE repo_id = ?1 AND sha = ?2",
            params![repo_id, sha],
        )?;
        Ok(())
    }

    pub fn mark_commits_pending(&self, repo_id: i64, shas: &[String]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for sha in shas {
            conn.execute(
                "UPDATE github_commits SET atomization_state = 'pending', atomized_at = NULL
                 WHERE repo_id = ?1 AND sha = ?2",
                params![repo_id, sha],
            )?;
        }
        Ok(())
    }

    /// Commits with `state = pending`, in ascending topological index (I7).
    pub fn list_pending_commits(&self, repo_id: i64, limit: usize) -> Result<Vec<Commit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, sha, message, author_name, author_email, author_time,
                    topological_index, parent_shas, files_json, atomization_state, atomized_at
             FROM github_commits
             WHERE repo_id = ?1 AND atomization_state = 'pending'
             ORDER BY topological_index ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, limit as i64], row_to_commit)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn get_commit(&self, repo_id: i64, sha: &str) -> Result<Option<Commit>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT repo_id, sha, message, author_name, author_email, author_time,
                    topological_index, parent_shas, files_json, atomization_state, atomized_at
             FROM github_commits WHERE repo_id = ?1 AND sha = ?2",
            params![repo_id, sha],
            row_to_commit,
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    /// All commits in the repo, ascending topological order (spec §4.3 P2
    /// "commits authored within ±window").
    pub fn list_commits(&self, repo_id: i64) -> Result<Vec<Commit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, sha, message, author_name, author_email, author_time,
                    topological_index, parent_shas, files_json, atomization_state, atomized_at
             FROM github_commits WHERE repo_id = ?1 ORDER BY topological_index ASC",
        )?;
        let rows = stmt.query_map(params![repo_id], row_to_commit)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    // -- Pull requests / issues / timeline ------------------------------

    pub fn upsert_pull_request(&self, pr: &PullRequest) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO github_pull_requests
                (repo_id, number, title, body, author, created_at, closed_at, merged_at,
                 merge_commit_sha, base_ref, head_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(repo_id, number) DO UPDATE SET
                title = excluded.title, body = excluded.body,
                closed_at = excluded.closed_at, merged_at = excluded.merged_at,
                merge_commit_sha = excluded.merge_commit_sha",
            params![
                pr.repo_id,
                pr.number,
                pr.title,
                pr.body,
                pr.author,
                pr.created_at.to_rfc3339(),
                pr.closed_at.map(|t| t.to_rfc3339()),
                pr.merged_at.map(|t| t.to_rfc3339()),
                pr.merge_commit_sha,
                pr.base_ref,
                pr.head_ref,
            ],
        )?;
        Ok(())
    }

    /// All pull requests in the repo (spec §4.3 P2 "PRs merged within
    /// ±window").
    pub fn list_pull_requests(&self, repo_id: i64) -> Result<Vec<PullRequest>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, number, title, body, author, created_at, closed_at, merged_at,
                    merge_commit_sha, base_ref, head_ref
             FROM github_pull_requests WHERE repo_id = ?1 ORDER BY number ASC",
        )?;
        let rows = stmt.query_map(params![repo_id], row_to_pull_request)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    pub fn get_pull_request(&self, repo_id: i64, number: i64) -> Result<Option<PullRequest>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT repo_id, number, title, body, author, created_at, closed_at, merged_at,
                    merge_commit_sha, base_ref, head_ref
             FROM github_pull_requests WHERE repo_id = ?1 AND number = ?2",
            params![repo_id, number],
            row_to_pull_request,
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    pub fn upsert_issue(&self, issue: &Issue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let labels_json = serde_json::to_string(&issue.labels)?;
        conn.execute(
            "INSERT INTO github_issues
                (repo_id, number, title, body, author, created_at, closed_at, labels_json, is_bug)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(repo_id, number) DO UPDATE SET
                title = excluded.title, body = excluded.body,
                closed_at = excluded.closed_at, labels_json = excluded.labels_json,
                is_bug = excluded.is_bug",
            params![
                issue.repo_id,
                issue.number,
                issue.title,
                issue.body,
                issue.author,
                issue.created_at.to_rfc3339(),
                issue.closed_at.map(|t| t.to_rfc3339()),
                labels_json,
                issue.is_bug as i64,
            ],
        )?;
        Ok(())
    }

    /// All issues in the repo (spec §4.3 P2 "closed Issue without
    /// high-confidence explicit links").
    pub fn list_issues(&self, repo_id: i64) -> Result<Vec<Issue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, number, title, body, author, created_at, closed_at, labels_json, is_bug
             FROM github_issues WHERE repo_id = ?1 ORDER BY number ASC",
        )?;
        let rows = stmt.query_map(params![repo_id], row_to_issue)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    pub fn get_issue(&self, repo_id: i64, number: i64) -> Result<Option<Issue>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT repo_id, number, title, body, author, created_at, closed_at, labels_json, is_bug
             FROM github_issues WHERE repo_id = ?1 AND number = ?2",
            params![repo_id, number],
            row_to_issue,
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    pub fn insert_timeline_event(&self, event: &TimelineEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let source_ref_json = event.source_ref.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO github_issue_timeline (repo_id, issue_number, kind, actor, timestamp, source_ref_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.repo_id,
                event.issue_number,
                event.kind.as_str(),
                event.actor,
                event.timestamp.to_rfc3339(),
                source_ref_json,
            ],
        )?;
        Ok(())
    }

    pub fn list_timeline_events(&self, repo_id: i64, issue_number: i64) -> Result<Vec<TimelineEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, issue_number, kind, actor, timestamp, source_ref_json
             FROM github_issue_timeline WHERE repo_id = ?1 AND issue_number = ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![repo_id, issue_number], |row| {
                let kind_str: String = row.get(2)?;
                let source_ref_json: Option<String> = row.get(5)?;
                Ok(TimelineEvent {
                    repo_id: row.get(0)?,
                    issue_number: row.get(1)?,
                    kind: parse_timeline_kind(&kind_str),
                    actor: row.get(3)?,
                    timestamp: parse_dt(Some(row.get(4)?)).unwrap(),
                    source_ref: source_ref_json.and_then(|j| serde_json::from_str(&j).ok()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Resolve `(repo, number)` against SS to determine whether it names an
    /// Issue or a PullRequest (spec §9, shared number space).
    pub fn resolve_entity(&self, repo_id: i64, number: i64) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let is_pr: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM github_pull_requests WHERE repo_id = ?1 AND number = ?2",
                params![repo_id, number],
                |row| row.get(0),
            )
            .optional()?;
        if is_pr.is_some() {
            return Ok(Some(Entity::PullRequest(number)));
        }
        let is_issue: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM github_issues WHERE repo_id = ?1 AND number = ?2",
                params![repo_id, number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(is_issue.map(|_| Entity::Issue(number)))
    }

    // -- Code blocks ------------------------------------------------------

    /// MERGE CodeBlock on its composite natural key (I1). Returns the
    /// internal row id (used only as a foreign key, never as graph
    /// identity — spec §4.5).
    pub fn upsert_code_block(
        &self,
        key: &CodeBlockKey,
        block_type: BlockType,
        start_line: u32,
        end_line: u32,
        language: &str,
        signature: Option<&str>,
        commit_sha: &str,
        author: &str,
        modified_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM code_blocks WHERE repo_id = ?1 AND file_path = ?2 AND block_name = ?3",
                params![key.repo_id, key.file_path, key.block_name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE code_blocks SET
                    start_line = ?1, end_line = ?2, last_modified_commit = ?3,
                    last_modified_time = ?4, last_modifier = ?5,
                    total_modifications = total_modifications + 1
                 WHERE id = ?6",
                params![
                    start_line,
                    end_line,
                    commit_sha,
                    modified_at.to_rfc3339(),
                    author,
                    id
                ],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO code_blocks
                (repo_id, file_path, block_name, block_type, start_line, end_line, language,
                 signature, first_seen_commit, last_modified_commit, last_modified_time,
                 original_author, last_modifier, incident_count, total_modifications)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?11, ?11, 0, 1)",
            params![
                key.repo_id,
                key.file_path,
                key.block_name,
                block_type_str(block_type),
                start_line,
                end_line,
                language,
                signature,
                commit_sha,
                modified_at.to_rfc3339(),
                author,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rename a block's canonical path while preserving its identity and
    /// history (S4) — used by the atomizer's `RENAME_BLOCK` handling.
    pub fn rename_code_block(&self, block_id: i64, new_path: &str, commit_sha: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let (repo_id, old_path): (i64, String) = conn.query_row(
            "SELECT repo_id, file_path FROM code_blocks WHERE id = ?1",
            params![block_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        conn.execute(
            "UPDATE code_blocks SET file_path = ?1 WHERE id = ?2",
            params![new_path, block_id],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO file_renames (repo_id, old_path, new_path, commit_sha)
             VALUES (?1, ?2, ?3, ?4)",
            params![repo_id, old_path, new_path, commit_sha],
        )?;
        Ok(())
    }

    /// Rename a block's name within the same file while preserving its
    /// identity and modification history (S4) — used by the atomizer's
    /// `RENAME_BLOCK` handling when the rename is a same-file block rename
    /// rather than a file move.
    pub fn rename_code_block_name(&self, block_id: i64, new_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE code_blocks SET block_name = ?1 WHERE id = ?2",
            params![new_name, block_id],
        )?;
        Ok(())
    }

    pub fn get_code_block_by_key(&self, key: &CodeBlockKey) -> Result<Option<CodeBlock>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, repo_id, file_path, block_name, block_type, start_line, end_line, language,
                    signature, first_seen_commit, last_modified_commit, last_modified_time,
                    original_author, last_modifier, incident_count, total_modifications
             FROM code_blocks WHERE repo_id = ?1 AND file_path = ?2 AND block_name = ?3",
            params![key.repo_id, key.file_path, key.block_name],
            row_to_code_block,
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    pub fn list_code_blocks_for_file(&self, repo_id: i64, file_path: &str) -> Result<Vec<CodeBlock>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, file_path, block_name, block_type, start_line, end_line, language,
                    signature, first_seen_commit, last_modified_commit, last_modified_time,
                    original_author, last_modifier, incident_count, total_modifications
             FROM code_blocks WHERE repo_id = ?1 AND file_path = ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, file_path], row_to_code_block)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// All blocks in a repo (used by the Risk Indexers' batch passes, which
    /// iterate the full block set rather than a single file's).
    pub fn list_code_blocks(&self, repo_id: i64) -> Result<Vec<CodeBlock>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, file_path, block_name, block_type, start_line, end_line, language,
                    signature, first_seen_commit, last_modified_commit, last_modified_time,
                    original_author, last_modifier, incident_count, total_modifications
             FROM code_blocks WHERE repo_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![repo_id], row_to_code_block)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Historical paths for a current path, derived from recorded renames
    /// (spec §4.6 path resolution; S4).
    pub fn resolve_historical_paths(&self, repo_id: i64, current_path: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT old_path FROM file_renames WHERE repo_id = ?1 AND new_path = ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, current_path], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn upsert_modification(&self, m: &CodeBlockModification) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO code_block_modifications (block_id, commit_sha, additions, deletions, patch_snippet, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(block_id, commit_sha) DO UPDATE SET
                additions = excluded.additions, deletions = excluded.deletions,
                patch_snippet = excluded.patch_snippet, kind = excluded.kind",
            params![
                m.block_id,
                m.commit_sha,
                m.additions,
                m.deletions,
                m.patch_snippet,
                modification_kind_str(m.kind),
            ],
        )?;
        Ok(())
    }

    /// Every modification row for a block, used by the Ownership/Familiarity
    /// pass to attribute edits to developers via each row's `commit_sha`.
    pub fn list_modifications_for_block(&self, block_id: i64) -> Result<Vec<CodeBlockModification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT block_id, commit_sha, additions, deletions, patch_snippet, kind
             FROM code_block_modifications WHERE block_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![block_id], |row| {
                Ok(CodeBlockModification {
                    block_id: row.get(0)?,
                    commit_sha: row.get(1)?,
                    additions: row.get(2)?,
                    deletions: row.get(3)?,
                    patch_snippet: row.get(4)?,
                    kind: parse_modification_kind(&row.get::<_, String>(5)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_modifications_for_block(&self, block_id: i64) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM code_block_modifications WHERE block_id = ?1",
            params![block_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn modifications_in_commit(&self, commit_sha: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT block_id FROM code_block_modifications WHERE commit_sha = ?1")?;
        let rows = stmt
            .query_map(params![commit_sha], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // -- Issue/PR/commit refs ---------------------------------------------

    pub fn insert_issue_commit_ref(&self, r: &IssueCommitRef) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let evidence_json = serde_json::to_string(&r.evidence)?;
        conn.execute(
            "INSERT INTO github_issue_commit_refs
                (repo_id, issue_number, commit_sha, pr_number, action, confidence,
                 detection_method, extracted_from, evidence_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                r.repo_id,
                r.issue_number,
                r.commit_sha,
                r.pr_number,
                r.action.as_str(),
                r.confidence,
                r.detection_method.as_str(),
                r.extracted_from,
                evidence_json,
            ],
        )?;
        Ok(())
    }

    pub fn list_refs_for_issue(&self, repo_id: i64, issue_number: i64) -> Result<Vec<IssueCommitRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, issue_number, commit_sha, pr_number, action, confidence,
                    detection_method, extracted_from, evidence_json
             FROM github_issue_commit_refs WHERE repo_id = ?1 AND issue_number = ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, issue_number], row_to_ref)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn list_all_refs(&self, repo_id: i64) -> Result<Vec<IssueCommitRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, issue_number, commit_sha, pr_number, action, confidence,
                    detection_method, extracted_from, evidence_json
             FROM github_issue_commit_refs WHERE repo_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![repo_id], row_to_ref)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Replace all refs for a repo (used by the merge step, which
    /// recomputes the deduped/boosted set from the raw appended refs). The
    /// merge step is the sole writer of this table in the production
    /// pipeline, so a full repo-scoped replace is safe; each row keeps the
    /// detection method that actually produced it (T4's audit requires
    /// `detection_method = commit_extraction` to survive merge, not be
    /// collapsed to a generic label).
    pub fn replace_merged_refs(&self, repo_id: i64, refs: &[IssueCommitRef]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM github_issue_commit_refs WHERE repo_id = ?1", params![repo_id])?;
        for r in refs {
            let evidence_json = serde_json::to_string(&r.evidence)?;
            tx.execute(
                "INSERT INTO github_issue_commit_refs
                    (repo_id, issue_number, commit_sha, pr_number, action, confidence,
                     detection_method, extracted_from, evidence_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    r.repo_id,
                    r.issue_number,
                    r.commit_sha,
                    r.pr_number,
                    r.action.as_str(),
                    r.confidence,
                    r.detection_method.as_str(),
                    r.extracted_from,
                    evidence_json,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // -- Risk indices -------------------------------------------------------

    pub fn upsert_incident(&self, incident: &CodeBlockIncident) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO code_block_incidents
                (block_id, issue_number, confidence, evidence_source, fix_commit_sha, incident_time, resolution_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(block_id, issue_number) DO UPDATE SET
                confidence = excluded.confidence, resolution_time = excluded.resolution_time",
            params![
                incident.block_id,
                incident.issue_number,
                incident.confidence,
                incident.evidence_source,
                incident.fix_commit_sha,
                incident.incident_time.to_rfc3339(),
                incident.resolution_time.map(|t| t.to_rfc3339()),
            ],
        )?;
        conn.execute(
            "UPDATE code_blocks SET incident_count = (
                SELECT COUNT(*) FROM code_block_incidents WHERE block_id = ?1
             ) WHERE id = ?1",
            params![incident.block_id],
        )?;
        Ok(())
    }

    pub fn list_incidents_for_block(&self, block_id: i64, cap: usize) -> Result<Vec<CodeBlockIncident>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT block_id, issue_number, confidence, evidence_source, fix_commit_sha,
                    incident_time, resolution_time
             FROM code_block_incidents WHERE block_id = ?1
             ORDER BY incident_time DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![block_id, cap as i64], |row| {
                Ok(CodeBlockIncident {
                    block_id: row.get(0)?,
                    issue_number: row.get(1)?,
                    confidence: row.get(2)?,
                    evidence_source: row.get(3)?,
                    fix_commit_sha: row.get(4)?,
                    incident_time: parse_dt(Some(row.get(5)?)).unwrap(),
                    resolution_time: parse_dt(row.get::<_, Option<String>>(6)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn upsert_coupling(&self, c: &CodeBlockCoupling) -> Result<()> {
        debug_assert!(c.block_a_id < c.block_b_id, "coupling pair must be ordered (T7)");
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO code_block_coupling
                (block_a_id, block_b_id, co_change_count, coupling_rate, first_co_change, last_co_change)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(block_a_id, block_b_id) DO UPDATE SET
                co_change_count = excluded.co_change_count,
                coupling_rate = excluded.coupling_rate,
                last_co_change = excluded.last_co_change",
            params![
                c.block_a_id,
                c.block_b_id,
                c.co_change_count,
                c.coupling_rate,
                c.first_co_change.to_rfc3339(),
                c.last_co_change.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_coupled_blocks(&self, block_id: i64, cap: usize) -> Result<Vec<CodeBlockCoupling>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT block_a_id, block_b_id, co_change_count, coupling_rate, first_co_change, last_co_change
             FROM code_block_coupling WHERE block_a_id = ?1 OR block_b_id = ?1
             ORDER BY coupling_rate DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![block_id, cap as i64], |row| {
                Ok(CodeBlockCoupling {
                    block_a_id: row.get(0)?,
                    block_b_id: row.get(1)?,
                    co_change_count: row.get(2)?,
                    coupling_rate: row.get(3)?,
                    first_co_change: parse_dt(Some(row.get(4)?)).unwrap(),
                    last_co_change: parse_dt(Some(row.get(5)?)).unwrap(),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn upsert_ownership(&self, o: &Ownership) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO code_block_ownership
                (block_id, developer, edit_count, last_edit_time, contribution_share, familiarity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(block_id, developer) DO UPDATE SET
                edit_count = excluded.edit_count, last_edit_time = excluded.last_edit_time,
                contribution_share = excluded.contribution_share, familiarity = excluded.familiarity",
            params![
                o.block_id,
                o.developer,
                o.edit_count,
                o.last_edit_time.to_rfc3339(),
                o.contribution_share,
                familiarity_str(o.familiarity),
            ],
        )?;
        Ok(())
    }

    pub fn list_ownership_for_block(&self, block_id: i64, top_k: usize) -> Result<Vec<Ownership>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT block_id, developer, edit_count, last_edit_time, contribution_share, familiarity
             FROM code_block_ownership WHERE block_id = ?1
             ORDER BY contribution_share DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![block_id, top_k as i64], |row| {
                let familiarity_str: String = row.get(5)?;
                Ok(Ownership {
                    block_id: row.get(0)?,
                    developer: row.get(1)?,
                    edit_count: row.get(2)?,
                    last_edit_time: parse_dt(Some(row.get(3)?)).unwrap(),
                    contribution_share: row.get(4)?,
                    familiarity: parse_familiarity(&familiarity_str),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Raw count of a table, used by Graph Projection's `validate` mode to
    /// compare SS counts against projected node/edge counts (spec §4.5).
    pub fn count_table(&self, table: &str, repo_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE repo_id = ?1");
        let count: i64 = conn.query_row(&sql, params![repo_id], |row| row.get(0))?;
        Ok(count)
    }

    /// Count of distinct values of `column` in `table` for a repo — used as
    /// the SS-side expectation for node labels that aren't backed by a
    /// dedicated table (`File`, `Developer`).
    pub fn count_distinct(&self, table: &str, column: &str, repo_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(DISTINCT {column}) FROM {table} WHERE repo_id = ?1");
        let count: i64 = conn.query_row(&sql, params![repo_id], |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct file paths known to the repo's code blocks — the SS-side
    /// source for projecting `File` nodes (spec §6).
    pub fn list_distinct_file_paths(&self, repo_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT DISTINCT file_path FROM code_blocks WHERE repo_id = ?1")?;
        let rows = stmt
            .query_map(params![repo_id], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Distinct commit author identities (`name <email>`) — the SS-side
    /// source for projecting `Developer` nodes.
    pub fn list_distinct_developers(&self, repo_id: i64) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT author_name, author_email FROM github_commits WHERE repo_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![repo_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Distinct issue numbers that have at least one recorded incident —
    /// the SS-side source for projecting `Incident` nodes.
    pub fn list_distinct_incident_issues(&self, repo_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT ci.issue_number FROM code_block_incidents ci
             JOIN code_blocks cb ON cb.id = ci.block_id
             WHERE cb.repo_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![repo_id], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // -- Graph projection (spec §4.5/§6) ---------------------------------

    /// Upsert a node by its natural key (never an internal row id).
    pub fn upsert_graph_node(&self, node: &GraphNode) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_nodes (repo_id, natural_key, label, properties_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(repo_id, natural_key) DO UPDATE SET
                label = excluded.label, properties_json = excluded.properties_json",
            params![node.repo_id, node.natural_key, node.label, node.properties.to_string()],
        )?;
        Ok(())
    }

    pub fn get_graph_node(&self, repo_id: i64, natural_key: &str) -> Result<Option<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT repo_id, natural_key, label, properties_json FROM graph_nodes
             WHERE repo_id = ?1 AND natural_key = ?2",
            params![repo_id, natural_key],
            row_to_graph_node,
        )
        .optional()
        .map_err(CoderiskError::from)
    }

    pub fn list_graph_nodes_by_label(&self, repo_id: i64, label: &str) -> Result<Vec<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, natural_key, label, properties_json FROM graph_nodes
             WHERE repo_id = ?1 AND label = ?2",
        )?;
        let rows = stmt
            .query_map(params![repo_id, label], row_to_graph_node)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Existence check for an edge endpoint (spec §4.5 "enforce existence
    /// checks for all endpoints of a projected edge").
    pub fn graph_node_exists(&self, repo_id: i64, natural_key: &str) -> Result<bool> {
        Ok(self.get_graph_node(repo_id, natural_key)?.is_some())
    }

    pub fn upsert_graph_edge(&self, edge: &GraphEdge) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_edges (repo_id, from_key, to_key, rel_type, properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repo_id, from_key, to_key, rel_type) DO UPDATE SET
                properties_json = excluded.properties_json",
            params![edge.repo_id, edge.from_key, edge.to_key, edge.rel_type, edge.properties.to_string()],
        )?;
        Ok(())
    }

    pub fn list_graph_edges_from(&self, repo_id: i64, from_key: &str, rel_type: &str) -> Result<Vec<GraphEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, from_key, to_key, rel_type, properties_json FROM graph_edges
             WHERE repo_id = ?1 AND from_key = ?2 AND rel_type = ?3",
        )?;
        let rows = stmt
            .query_map(params![repo_id, from_key, rel_type], row_to_graph_edge)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn list_graph_edges_either(&self, repo_id: i64, key: &str, rel_type: &str) -> Result<Vec<GraphEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT repo_id, from_key, to_key, rel_type, properties_json FROM graph_edges
             WHERE repo_id = ?1 AND rel_type = ?2 AND (from_key = ?3 OR to_key = ?3)",
        )?;
        let rows = stmt
            .query_map(params![repo_id, rel_type, key], row_to_graph_edge)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_graph_nodes(&self, repo_id: i64, label: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM graph_nodes WHERE repo_id = ?1 AND label = ?2",
            params![repo_id, label],
            |row| row.get(0),
        )
        .map_err(CoderiskError::from)
    }

    pub fn count_graph_edges(&self, repo_id: i64, rel_type: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM graph_edges WHERE repo_id = ?1 AND rel_type = ?2",
            params![repo_id, rel_type],
            |row| row.get(0),
        )
        .map_err(CoderiskError::from)
    }

    /// `full` projection mode: clears a repo's subgraph before rebuilding
    /// (spec §4.5).
    pub fn clear_repo_subgraph(&self, repo_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM graph_nodes WHERE repo_id = ?1", params![repo_id])?;
        tx.execute("DELETE FROM graph_edges WHERE repo_id = ?1", params![repo_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn maintenance_vacuum_analyze(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM; ANALYZE;")?;
        Ok(())
    }

    /// Escape hatch for sibling modules in this crate (e.g. `checkpoint`)
    /// that need direct connection access without duplicating the
    /// lock-and-borrow boilerplate every method here already has.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

fn block_type_str(t: BlockType) -> &'static str {
    match t {
        BlockType::Function => "function",
        BlockType::Method => "method",
        BlockType::Class => "class",
        BlockType::Component => "component",
    }
}

fn parse_block_type(s: &str) -> BlockType {
    match s {
        "method" => BlockType::Method,
        "class" => BlockType::Class,
        "component" => BlockType::Component,
        _ => BlockType::Function,
    }
}

fn modification_kind_str(k: ModificationKind) -> &'static str {
    match k {
        ModificationKind::Created => "created",
        ModificationKind::Modified => "modified",
        ModificationKind::Deleted => "deleted",
        ModificationKind::Renamed => "renamed",
    }
}

fn parse_modification_kind(s: &str) -> ModificationKind {
    match s {
        "created" => ModificationKind::Created,
        "deleted" => ModificationKind::Deleted,
        "renamed" => ModificationKind::Renamed,
        _ => ModificationKind::Modified,
    }
}

fn familiarity_str(f: FamiliarityTier) -> &'static str {
    match f {
        FamiliarityTier::Owner => "owner",
        FamiliarityTier::Contributor => "contributor",
        FamiliarityTier::Visitor => "visitor",
    }
}

fn parse_familiarity(s: &str) -> FamiliarityTier {
    match s {
        "owner" => FamiliarityTier::Owner,
        "contributor" => FamiliarityTier::Contributor,
        _ => FamiliarityTier::Visitor,
    }
}

fn parse_timeline_kind(s: &str) -> TimelineEventKind {
    match s {
        "closed" => TimelineEventKind::Closed,
        "merged" => TimelineEventKind::Merged,
        "referenced" => TimelineEventKind::Referenced,
        _ => TimelineEventKind::CrossReferenced,
    }
}

fn row_to_graph_node(row: &rusqlite::Row) -> rusqlite::Result<GraphNode> {
    let properties_json: String = row.get(3)?;
    Ok(GraphNode {
        repo_id: row.get(0)?,
        natural_key: row.get(1)?,
        label: row.get(2)?,
        properties: serde_json::from_str(&properties_json).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_graph_edge(row: &rusqlite::Row) -> rusqlite::Result<GraphEdge> {
    let properties_json: String = row.get(4)?;
    Ok(GraphEdge {
        repo_id: row.get(0)?,
        from_key: row.get(1)?,
        to_key: row.get(2)?,
        rel_type: row.get(3)?,
        properties: serde_json::from_str(&properties_json).unwrap_or(serde_json::Value::Null),
    })
}

fn parse_dt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

fn row_to_commit(row: &rusqlite::Row) -> rusqlite::Result<Commit> {
    let files_json: String = row.get(8)?;
    let parents_json: String = row.get(7)?;
    let state_str: String = row.get(9)?;
    Ok(Commit {
        repo_id: row.get(0)?,
        sha: row.get(1)?,
        message: row.get(2)?,
        author_name: row.get(3)?,
        author_email: row.get(4)?,
        author_time: parse_dt(Some(row.get(5)?)).unwrap(),
        topological_index: row.get(6)?,
        parent_shas: serde_json::from_str(&parents_json).unwrap_or_default(),
        files: serde_json::from_str(&files_json).unwrap_or_default(),
        atomization_state: AtomizationState::parse(&state_str).unwrap_or(AtomizationState::Pending),
        atomized_at: parse_dt(row.get::<_, Option<String>>(10)?),
    })
}

fn row_to_pull_request(row: &rusqlite::Row) -> rusqlite::Result<PullRequest> {
    Ok(PullRequest {
        repo_id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        author: row.get(4)?,
        created_at: parse_dt(Some(row.get(5)?)).unwrap(),
        closed_at: parse_dt(row.get::<_, Option<String>>(6)?),
        merged_at: parse_dt(row.get::<_, Option<String>>(7)?),
        merge_commit_sha: row.get(8)?,
        base_ref: row.get(9)?,
        head_ref: row.get(10)?,
    })
}

fn row_to_issue(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let labels_json: String = row.get(7)?;
    let is_bug: i64 = row.get(8)?;
    Ok(Issue {
        repo_id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        author: row.get(4)?,
        created_at: parse_dt(Some(row.get(5)?)).unwrap(),
        closed_at: parse_dt(row.get::<_, Option<String>>(6)?),
        labels: serde_json::from_str(&labels_json).unwrap_or_default(),
        is_bug: is_bug != 0,
    })
}

fn row_to_code_block(row: &rusqlite::Row) -> rusqlite::Result<CodeBlock> {
    let block_type_str: String = row.get(4)?;
    Ok(CodeBlock {
        id: row.get(0)?,
        key: CodeBlockKey {
            repo_id: row.get(1)?,
            file_path: row.get(2)?,
            block_name: row.get(3)?,
        },
        block_type: parse_block_type(&block_type_str),
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        language: row.get(7)?,
        signature: row.get(8)?,
        first_seen_commit: row.get(9)?,
        last_modified_commit: row.get(10)?,
        last_modified_time: parse_dt(Some(row.get(11)?)).unwrap(),
        original_author: row.get(12)?,
        last_modifier: row.get(13)?,
        incident_count: row.get(14)?,
        total_modifications: row.get(15)?,
    })
}

fn row_to_ref(row: &rusqlite::Row) -> rusqlite::Result<IssueCommitRef> {
    let action_str: String = row.get(4)?;
    let method_str: String = row.get(6)?;
    let evidence_json: String = row.get(8)?;
    Ok(IssueCommitRef {
        repo_id: row.get(0)?,
        issue_number: row.get(1)?,
        commit_sha: row.get(2)?,
        pr_number: row.get(3)?,
        action: parse_action(&action_str),
        confidence: row.get(5)?,
        detection_method: parse_detection_method(&method_str),
        extracted_from: row.get(7)?,
        evidence: serde_json::from_str(&evidence_json).unwrap_or_default(),
    })
}

fn parse_action(s: &str) -> RefAction {
    match s {
        "fixes" => RefAction::Fixes,
        "closes" => RefAction::Closes,
        "resolves" => RefAction::Resolves,
        "associated_with" => RefAction::AssociatedWith,
        _ => RefAction::Mentions,
    }
}

fn parse_detection_method(s: &str) -> DetectionMethod {
    match s {
        "commit_extraction" => DetectionMethod::CommitExtraction,
        "pr_extraction" => DetectionMethod::PrExtraction,
        "timeline" => DetectionMethod::Timeline,
        "semantic_similarity" => DetectionMethod::SemanticSimilarity,
        _ => DetectionMethod::Temporal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit(repo_id: i64, sha: &str, topo: i64) -> Commit {
        Commit {
            repo_id,
            sha: sha.to_string(),
            message: format!("Fix thing (#{topo})"),
            author_name: "dev".to_string(),
            author_email: "dev@example.com".to_string(),
            author_time: chrono::Utc::now(),
            topological_index: topo,
            parent_shas: vec![],
            files: vec![],
            atomization_state: AtomizationState::Pending,
            atomized_at: None,
        }
    }

    #[test]
    fn repository_upsert_is_idempotent_on_natural_key() {
        let store = StagingStore::open_in_memory().unwrap();
        let id1 = store.upsert_repository("acme", "widgets", "main").unwrap();
        let id2 = store.upsert_repository("acme", "widgets", "main").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn pending_commits_ordered_by_topological_index() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        store.upsert_commit(&sample_commit(repo_id, "c3", 3)).unwrap();
        store.upsert_commit(&sample_commit(repo_id, "c1", 1)).unwrap();
        store.upsert_commit(&sample_commit(repo_id, "c2", 2)).unwrap();

        let pending = store.list_pending_commits(repo_id, 10).unwrap();
        let shas: Vec<&str> = pending.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn list_commits_issues_and_pull_requests_round_trip() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        store.upsert_commit(&sample_commit(repo_id, "c1", 1)).unwrap();

        store
            .upsert_issue(&Issue {
                repo_id,
                number: 7,
                title: "bug".to_string(),
                body: Some("repro steps".to_string()),
                author: "dev".to_string(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                labels: vec!["bug".to_string()],
                is_bug: true,
            })
            .unwrap();

        store
            .upsert_pull_request(&PullRequest {
                repo_id,
                number: 9,
                title: "fix bug".to_string(),
                body: None,
                author: "dev".to_string(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                merged_at: None,
                merge_commit_sha: None,
                base_ref: "main".to_string(),
                head_ref: "fix/9".to_string(),
            })
            .unwrap();

        assert_eq!(store.list_commits(repo_id).unwrap().len(), 1);
        assert_eq!(store.list_issues(repo_id).unwrap()[0].number, 7);
        assert_eq!(store.get_issue(repo_id, 7).unwrap().unwrap().title, "bug");
        assert_eq!(store.list_pull_requests(repo_id).unwrap()[0].number, 9);
        assert_eq!(store.get_pull_request(repo_id, 9).unwrap().unwrap().head_ref, "fix/9");
    }

    #[test]
    fn code_block_upsert_merges_on_composite_key_not_line_numbers() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        let key = CodeBlockKey {
            repo_id,
            file_path: "src/auth.rs".to_string(),
            block_name: "refresh_token".to_string(),
        };
        let now = chrono::Utc::now();
        let id1 = store
            .upsert_code_block(&key, BlockType::Function, 10, 20, "rust", None, "c1", "alice", now)
            .unwrap();
        // Same identity, different line range (simulates a later edit shifting lines).
        let id2 = store
            .upsert_code_block(&key, BlockType::Function, 40, 55, "rust", None, "c2", "bob", now)
            .unwrap();
        assert_eq!(id1, id2, "I1: identity must not depend on line numbers");

        let block = store.get_code_block_by_key(&key).unwrap().unwrap();
        assert_eq!(block.start_line, 40);
        assert_eq!(block.total_modifications, 2);
    }

    #[test]
    fn entity_resolution_distinguishes_issue_from_pr() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        store
            .upsert_issue(&Issue {
                repo_id,
                number: 42,
                title: "bug".into(),
                body: None,
                author: "alice".into(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                labels: vec![],
                is_bug: true,
            })
            .unwrap();
        store
            .upsert_pull_request(&PullRequest {
                repo_id,
                number: 7,
                title: "feature".into(),
                body: None,
                author: "bob".into(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                merged_at: None,
                merge_commit_sha: None,
                base_ref: "main".into(),
                head_ref: "feature".into(),
            })
            .unwrap();

        assert_eq!(store.resolve_entity(repo_id, 42).unwrap(), Some(Entity::Issue(42)));
        assert_eq!(store.resolve_entity(repo_id, 7).unwrap(), Some(Entity::PullRequest(7)));
        assert_eq!(store.resolve_entity(repo_id, 999).unwrap(), None);
    }

    #[test]
    fn graph_node_upsert_is_keyed_by_natural_key_not_row_id() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        let node = GraphNode {
            repo_id,
            natural_key: "CodeBlock:1:src/auth.rs:login".to_string(),
            label: "CodeBlock".to_string(),
            properties: serde_json::json!({"incident_count": 0}),
        };
        store.upsert_graph_node(&node).unwrap();
        store
            .upsert_graph_node(&GraphNode { properties: serde_json::json!({"incident_count": 2}), ..node.clone() })
            .unwrap();

        assert_eq!(store.count_graph_nodes(repo_id, "CodeBlock").unwrap(), 1);
        let fetched = store.get_graph_node(repo_id, &node.natural_key).unwrap().unwrap();
        assert_eq!(fetched.properties["incident_count"], 2);
    }

    #[test]
    fn clear_repo_subgraph_removes_nodes_and_edges() {
        let store = StagingStore::open_in_memory().unwrap();
        let repo_id = store.upsert_repository("acme", "widgets", "main").unwrap();
        store
            .upsert_graph_node(&GraphNode {
                repo_id,
                natural_key: "File:src/auth.rs".to_string(),
                label: "File".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();
        store
            .upsert_graph_edge(&GraphEdge {
                repo_id,
                from_key: "File:src/auth.rs".to_string(),
                to_key: "CodeBlock:1:src/auth.rs:login".to_string(),
                rel_type: "CONTAINS".to_string(),
                properties: serde_json::json!({}),
            })
            .unwrap();

        store.clear_repo_subgraph(repo_id).unwrap();
        assert_eq!(store.count_graph_nodes(repo_id, "File").unwrap(), 0);
        assert_eq!(store.count_graph_edges(repo_id, "CONTAINS").unwrap(), 0);
    }

    #[test]
    fn coupling_rejects_unordered_pair_in_debug() {
        let store = StagingStore::open_in_memory().unwrap();
        let now = chrono::Utc::now();
        let ordered = CodeBlockCoupling::ordered(9, 3, 4, 0.5, now, now);
        // Constructing via `ordered` always yields a < b, so direct upsert succeeds.
        store.upsert_coupling(&ordered).unwrap();
        assert!(ordered.block_a_id < ordered.block_b_id);
    }
}
