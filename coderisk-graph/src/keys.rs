//! Natural-key builders for every node label in spec §6.
//!
//! `graph_nodes` is keyed `(repo_id, natural_key)` with no separate label
//! column in the key, so every key here is label-prefixed to stay unique
//! across node types that otherwise share an identifier space (a file path
//! and a code block in that file, for instance).

pub fn file_key(file_path: &str) -> String {
    format!("File:{file_path}")
}

pub fn code_block_key(file_path: &str, block_name: &str) -> String {
    format!("CodeBlock:{file_path}:{block_name}")
}

pub fn commit_key(sha: &str) -> String {
    format!("Commit:{sha}")
}

pub fn developer_key(email: &str) -> String {
    format!("Developer:{email}")
}

pub fn issue_key(number: i64) -> String {
    format!("Issue:{number}")
}

pub fn pull_request_key(number: i64) -> String {
    format!("PullRequest:{number}")
}

pub fn incident_key(issue_number: i64) -> String {
    format!("Incident:{issue_number}")
}

/// Inverse of [`code_block_key`] — used by readers (the query engine's GP
/// path) that walk edges and need to recover `(file_path, block_name)` from
/// the key on the other end.
pub fn parse_code_block_key(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix("CodeBlock:")?;
    let (file_path, block_name) = rest.rsplit_once(':')?;
    Some((file_path.to_string(), block_name.to_string()))
}

/// Inverse of [`incident_key`].
pub fn parse_incident_key(key: &str) -> Option<i64> {
    key.strip_prefix("Incident:")?.parse().ok()
}
