//! Staging-store schema and migrations (spec §6 "Staging store").
//!
//! One SQLite database per repository clone holds both the staging-store
//! (source of truth) tables and the graph-projection (derived cache)
//! tables; they are migrated together so there is never a window where one
//! exists without the other.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Initialize or migrate the database schema, applying only the
/// migrations the connection hasn't seen yet.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    let version = get_schema_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// V1: repositories, commits, pull requests, issues, timeline, comments —
/// the tables Platform Fetcher owns (spec §6).
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS github_repositories (
            id INTEGER PRIMARY KEY,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            default_branch TEXT NOT NULL,
            last_commit_time TEXT,
            last_issue_update_time TEXT,
            parent_shas_hash TEXT,
            UNIQUE(owner, name)
        );

        CREATE TABLE IF NOT EXISTS github_commits (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            sha TEXT NOT NULL,
            message TEXT NOT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT NOT NULL,
            author_time TEXT NOT NULL,
            topological_index INTEGER NOT NULL,
            parent_shas TEXT NOT NULL,
            files_json TEXT NOT NULL,
            atomization_state TEXT NOT NULL DEFAULT 'pending',
            atomized_at TEXT,
            PRIMARY KEY (repo_id, sha)
        );
        CREATE INDEX IF NOT EXISTS idx_commits_repo_sha ON github_commits(repo_id, sha);
        CREATE INDEX IF NOT EXISTS idx_commits_author_date ON github_commits(repo_id, author_time);
        CREATE INDEX IF NOT EXISTS idx_commits_topo ON github_commits(repo_id, topological_index);

        CREATE TABLE IF NOT EXISTS github_pull_requests (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            body TEXT,
            author TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed_at TEXT,
            merged_at TEXT,
            merge_commit_sha TEXT,
            base_ref TEXT NOT NULL,
            head_ref TEXT NOT NULL,
            files_json TEXT,
            PRIMARY KEY (repo_id, number)
        );
        CREATE INDEX IF NOT EXISTS idx_prs_repo_number ON github_pull_requests(repo_id, number);

        CREATE TABLE IF NOT EXISTS github_issues (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            body TEXT,
            author TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed_at TEXT,
            labels_json TEXT NOT NULL DEFAULT '[]',
            is_bug INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (repo_id, number)
        );
        CREATE INDEX IF NOT EXISTS idx_issues_repo_number ON github_issues(repo_id, number);

        CREATE TABLE IF NOT EXISTS github_issue_timeline (
            id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            issue_number INTEGER NOT NULL,
            kind TEXT NOT NULL,
            actor TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            source_ref_json TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_timeline_issue ON github_issue_timeline(repo_id, issue_number);

        CREATE TABLE IF NOT EXISTS github_issue_comments (
            id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            issue_number INTEGER NOT NULL,
            author TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_issue ON github_issue_comments(repo_id, issue_number);",
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}

/// V2: code blocks, modifications, issue-commit refs, risk indices — the
/// tables the Commit Atomizer, Issue Linker and Risk Indexers own.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS code_blocks (
            id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            file_path TEXT NOT NULL,
            block_name TEXT NOT NULL,
            block_type TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            language TEXT NOT NULL,
            signature TEXT,
            first_seen_commit TEXT NOT NULL,
            last_modified_commit TEXT NOT NULL,
            last_modified_time TEXT NOT NULL,
            original_author TEXT NOT NULL,
            last_modifier TEXT NOT NULL,
            incident_count INTEGER NOT NULL DEFAULT 0,
            total_modifications INTEGER NOT NULL DEFAULT 0,
            UNIQUE(repo_id, file_path, block_name)
        );
        CREATE INDEX IF NOT EXISTS idx_blocks_repo_file ON code_blocks(repo_id, file_path);

        CREATE TABLE IF NOT EXISTS code_block_modifications (
            block_id INTEGER NOT NULL REFERENCES code_blocks(id),
            commit_sha TEXT NOT NULL,
            additions INTEGER NOT NULL,
            deletions INTEGER NOT NULL,
            patch_snippet TEXT,
            kind TEXT NOT NULL,
            PRIMARY KEY (block_id, commit_sha)
        );

        CREATE TABLE IF NOT EXISTS github_issue_commit_refs (
            id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            issue_number INTEGER NOT NULL,
            commit_sha TEXT,
            pr_number INTEGER,
            action TEXT NOT NULL,
            confidence REAL NOT NULL,
            detection_method TEXT NOT NULL,
            extracted_from TEXT NOT NULL,
            evidence_json TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_refs_issue ON github_issue_commit_refs(repo_id, issue_number);
        CREATE INDEX IF NOT EXISTS idx_refs_commit ON github_issue_commit_refs(repo_id, commit_sha);

        CREATE TABLE IF NOT EXISTS code_block_incidents (
            block_id INTEGER NOT NULL REFERENCES code_blocks(id),
            issue_number INTEGER NOT NULL,
            confidence REAL NOT NULL,
            evidence_source TEXT NOT NULL,
            fix_commit_sha TEXT NOT NULL,
            incident_time TEXT NOT NULL,
            resolution_time TEXT,
            PRIMARY KEY (block_id, issue_number)
        );
        CREATE INDEX IF NOT EXISTS idx_incidents_date ON code_block_incidents(block_id, incident_time DESC);

        CREATE TABLE IF NOT EXISTS code_block_coupling (
            block_a_id INTEGER NOT NULL REFERENCES code_blocks(id),
            block_b_id INTEGER NOT NULL REFERENCES code_blocks(id),
            co_change_count INTEGER NOT NULL,
            coupling_rate REAL NOT NULL,
            first_co_change TEXT NOT NULL,
            last_co_change TEXT NOT NULL,
            PRIMARY KEY (block_a_id, block_b_id),
            CHECK (block_a_id < block_b_id)
        );
        CREATE INDEX IF NOT EXISTS idx_coupling_rate ON code_block_coupling(block_a_id, coupling_rate DESC);

        CREATE TABLE IF NOT EXISTS code_block_ownership (
            block_id INTEGER NOT NULL REFERENCES code_blocks(id),
            developer TEXT NOT NULL,
            edit_count INTEGER NOT NULL,
            last_edit_time TEXT NOT NULL,
            contribution_share REAL NOT NULL,
            familiarity TEXT NOT NULL,
            PRIMARY KEY (block_id, developer)
        );

        CREATE TABLE IF NOT EXISTS file_renames (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            old_path TEXT NOT NULL,
            new_path TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            PRIMARY KEY (repo_id, old_path, commit_sha)
        );
        CREATE INDEX IF NOT EXISTS idx_renames_new_path ON file_renames(repo_id, new_path);",
    )?;

    set_schema_version(conn, 2)?;
    Ok(())
}

/// V3: checkpoints (Orchestrator, spec §4.7) and the graph-projection
/// tables (Graph Projection, spec §4.5/§6). Node/edge rows carry a natural
/// key; internal store IDs are never reused as graph identity (spec §4.5).
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS checkpoints (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            stage TEXT NOT NULL,
            cursor TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (repo_id, stage)
        );

        CREATE TABLE IF NOT EXISTS graph_nodes (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            natural_key TEXT NOT NULL,
            label TEXT NOT NULL,
            properties_json TEXT NOT NULL,
            PRIMARY KEY (repo_id, natural_key)
        );
        CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(repo_id, label);

        CREATE TABLE IF NOT EXISTS graph_edges (
            repo_id INTEGER NOT NULL REFERENCES github_repositories(id),
            from_key TEXT NOT NULL,
            to_key TEXT NOT NULL,
            rel_type TEXT NOT NULL,
            properties_json TEXT NOT NULL,
            PRIMARY KEY (repo_id, from_key, to_key, rel_type)
        );
        CREATE INDEX IF NOT EXISTS idx_graph_edges_from ON graph_edges(repo_id, from_key, rel_type);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(repo_id, to_key, rel_type);",
    )?;

    set_schema_version(conn, 3)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "github_repositories",
            "github_commits",
            "github_pull_requests",
            "github_issues",
            "github_issue_timeline",
            "github_issue_comments",
            "code_blocks",
            "code_block_modifications",
            "github_issue_commit_refs",
            "code_block_incidents",
            "code_block_coupling",
            "code_block_ownership",
            "file_renames",
            "checkpoints",
            "graph_nodes",
            "graph_edges",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn coupling_check_constraint_rejects_unordered_pair() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO github_repositories (id, owner, name, default_branch) VALUES (1, 'o', 'n', 'main')",
            [],
        )
        .unwrap();
        let now = "2026-01-01T00:00:00Z";
        let err = conn
            .execute(
                "INSERT INTO code_block_coupling (block_a_id, block_b_id, co_change_count, coupling_rate, first_co_change, last_co_change) VALUES (5, 2, 1, 0.5, ?1, ?1)",
                [now],
            )
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(_, _)));
    }
}
