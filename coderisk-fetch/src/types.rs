//! Platform-shaped intermediates, identical to `coderisk_core::types`'
//! entities minus `repo_id` (which the platform client doesn't know — only
//! the staging store assigns it on upsert, spec §3 "Repository").

use chrono::{DateTime, Utc};
use coderisk_core::types::{
    Commit, FilePatch, Issue, PullRequest, TimelineEvent, TimelineEventKind,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RawCommit {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: DateTime<Utc>,
    pub parent_shas: Vec<String>,
    pub files: Vec<FilePatch>,
}

impl RawCommit {
    /// Attach `repo_id` and a topological index (spec §3's monotone
    /// integer, assigned by the caller's reverse-topological walk — here,
    /// simply the caller-supplied ordinal since GitHub already returns
    /// commits newest-first per page).
    pub fn into_commit(self, repo_id: i64, topological_index: i64) -> Commit {
        Commit {
            repo_id,
            sha: self.sha,
            message: self.message,
            author_name: self.author_name,
            author_email: self.author_email,
            author_time: self.author_time,
            topological_index,
            parent_shas: self.parent_shas,
            files: self.files,
            atomization_state: coderisk_core::types::AtomizationState::Pending,
            atomized_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPullRequest {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub base_ref: String,
    pub head_ref: String,
}

impl RawPullRequest {
    pub fn into_pull_request(self, repo_id: i64) -> PullRequest {
        PullRequest {
            repo_id,
            number: self.number,
            title: self.title,
            body: self.body,
            author: self.author,
            created_at: self.created_at,
            closed_at: self.closed_at,
            merged_at: self.merged_at,
            merge_commit_sha: self.merge_commit_sha,
            base_ref: self.base_ref,
            head_ref: self.head_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawIssue {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
}

/// Labels that heuristically mark an issue as a bug report (spec §3 "is-bug
/// flag (heuristic)").
const BUG_LABELS: &[&str] = &["bug", "type:bug", "type: bug", "kind/bug", "defect"];

impl RawIssue {
    pub fn into_issue(self, repo_id: i64) -> Issue {
        let is_bug = self.labels.iter().any(|l| BUG_LABELS.contains(&l.to_lowercase().as_str()));
        Issue {
            repo_id,
            number: self.number,
            title: self.title,
            body: self.body,
            author: self.author,
            created_at: self.created_at,
            closed_at: self.closed_at,
            labels: self.labels,
            is_bug,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTimelineEvent {
    pub issue_number: i64,
    pub kind: TimelineEventKind,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub source_ref: Option<coderisk_core::types::SourceRef>,
}

impl RawTimelineEvent {
    pub fn into_event(self, repo_id: i64) -> TimelineEvent {
        TimelineEvent {
            repo_id,
            issue_number: self.issue_number,
            kind: self.kind,
            actor: self.actor,
            timestamp: self.timestamp,
            source_ref: self.source_ref,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_label_detection_is_case_insensitive() {
        let issue = RawIssue {
            number: 1,
            title: "x".into(),
            body: None,
            author: "a".into(),
            created_at: Utc::now(),
            closed_at: None,
            labels: vec!["Bug".to_string(), "priority:high".to_string()],
        };
        assert!(issue.into_issue(1).is_bug);
    }

    #[test]
    fn non_bug_labels_do_not_set_is_bug() {
        let issue = RawIssue {
            number: 2,
            title: "x".into(),
            body: None,
            author: "a".into(),
            created_at: Utc::now(),
            closed_at: None,
            labels: vec!["enhancement".to_string()],
        };
        assert!(!issue.into_issue(1).is_bug);
    }
}
