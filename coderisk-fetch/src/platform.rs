//! The hosting-platform client contract (spec §4.1, §6 "Platform API").
//!
//! Unlike the LLM provider (spec.md §1's opaque external collaborator),
//! the hosting-platform client is in scope here: "Ingestion of
//! hosting-platform data... with rate-limit discipline and incremental
//! re-entry" is core responsibility #1. [`PlatformClient`] is still a
//! trait, though, so the orchestrator and tests can swap in a fixture
//! without a live network dependency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{RawCommit, RawIssue, RawPullRequest, RawTimelineEvent};

/// A page of results plus the cursor to request the next page, or `None`
/// when exhausted (spec §4.1 "link-header pagination").
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Resolve the repository's default branch, used to seed SS's
    /// `github_repositories` row.
    async fn default_branch(&self, owner: &str, name: &str) -> Result<String>;

    /// Commits reachable from the default branch with `author_date >=
    /// since` (or all history when `since` is `None`), with full per-file
    /// patch payloads (spec §4.1 "Patch payload": "A hosting platform's
    /// GraphQL equivalent that lacks patches is not sufficient").
    async fn fetch_commits(
        &self,
        owner: &str,
        name: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawCommit>>;

    async fn fetch_pull_requests(
        &self,
        owner: &str,
        name: &str,
        updated_since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawPullRequest>>;

    async fn fetch_issues(
        &self,
        owner: &str,
        name: &str,
        updated_since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<Page<RawIssue>>;

    async fn fetch_issue_timeline(
        &self,
        owner: &str,
        name: &str,
        issue_number: i64,
        page: u32,
    ) -> Result<Page<RawTimelineEvent>>;
}
