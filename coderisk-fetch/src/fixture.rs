//! A deterministic [`PlatformClient`] for tests, returning canned pages
//! without a network call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::platform::{Page, PlatformClient};
use crate::types::{RawCommit, RawIssue, RawPullRequest, RawTimelineEvent};
use coderisk_core::types::{FileChangeStatus, FilePatch};

#[derive(Debug, Clone, Default)]
pub struct FixtureClient {
    pub commits: Vec<RawCommit>,
    pub pull_requests: Vec<RawPullRequest>,
    pub issues: Vec<RawIssue>,
    pub timeline: Vec<RawTimelineEvent>,
    pub default_branch: String,
}

impl FixtureClient {
    /// A small, internally-consistent fixture: one commit referencing an
    /// issue by number, matching scenario S1's literal commit message.
    pub fn sample() -> Self {
        let now = Utc::now();
        Self {
            default_branch: "main".to_string(),
            commits: vec![RawCommit {
                sha: "deadbeef".to_string(),
                message: "Fix authentication timeout bug (#127)".to_string(),
                author_name: "alice".to_string(),
                author_email: "alice@example.com".to_string(),
                author_time: now,
                parent_shas: vec![],
                files: vec![FilePatch {
                    path: "src/auth.rs".to_string(),
                    additions: 5,
                    deletions: 2,
                    patch: Some("@@ -1,3 +1,6 @@\n+fn refresh_token() {}\n".to_string()),
                    status: FileChangeStatus::Modified,
                }],
            }],
            pull_requests: vec![],
            issues: vec![RawIssue {
                number: 127,
                title: "Auth times out".to_string(),
                body: Some("Tokens expire too early".to_string()),
                author: "bob".to_string(),
                created_at: now,
                closed_at: Some(now),
                labels: vec!["bug".to_string()],
            }],
            timeline: vec![],
        }
    }
}

#[async_trait]
impl PlatformClient for FixtureClient {
    async fn default_branch(&self, _owner: &str, _name: &str) -> Result<String> {
        Ok(self.default_branch.clone())
    }

    async fn fetch_commits(
        &self,
        _owner: &str,
        _name: &str,
        _since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawCommit>> {
        Ok(page_one(&self.commits, page))
    }

    async fn fetch_pull_requests(
        &self,
        _owner: &str,
        _name: &str,
        _updated_since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawPullRequest>> {
        Ok(page_one(&self.pull_requests, page))
    }

    async fn fetch_issues(
        &self,
        _owner: &str,
        _name: &str,
        _updated_since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawIssue>> {
        Ok(page_one(&self.issues, page))
    }

    async fn fetch_issue_timeline(
        &self,
        _owner: &str,
        _name: &str,
        issue_number: i64,
        page: u32,
    ) -> Result<Page<RawTimelineEvent>> {
        let matching: Vec<RawTimelineEvent> =
            self.timeline.iter().filter(|e| e.issue_number == issue_number).cloned().collect();
        Ok(page_one(&matching, page))
    }
}

fn page_one<T: Clone>(items: &[T], page: u32) -> Page<T> {
    if page == 1 {
        Page { items: items.to_vec(), next_page: None }
    } else {
        Page { items: vec![], next_page: None }
    }
}
