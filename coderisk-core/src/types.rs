//! Data model (spec §3). Shapes are deliberately flat and serde-derived so
//! every stage can move them in and out of the staging store and across
//! batch boundaries without bespoke conversions.

use serde::{Deserialize, Serialize};

/// A repository under ingestion, with its incremental cursors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    /// `max(author_date)` across ingested commits; the PF incremental anchor.
    pub last_commit_time: Option<chrono::DateTime<chrono::Utc>>,
    /// `updated_since` anchor for issues/PRs.
    pub last_issue_update_time: Option<chrono::DateTime<chrono::Utc>>,
    /// `hash(sorted(parent_shas))`; a change invalidates topological order (I8).
    pub parent_shas_hash: Option<String>,
}

impl Repository {
    pub fn natural_key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomizationState {
    Pending,
    Atomized,
    Skipped,
}

impl AtomizationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomizationState::Pending => "pending",
            AtomizationState::Atomized => "atomized",
            AtomizationState::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "atomized" => Some(Self::Atomized),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// A single file's patch payload within a commit, bounded at ingestion
/// time (spec §9, "patch data size").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePatch {
    pub path: String,
    pub additions: u32,
    pub deletions: u32,
    /// `None` when the file exceeded the size threshold at ingestion; the
    /// commit row still exists, it is just noted rather than dropped.
    pub patch: Option<String>,
    pub status: FileChangeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// Commit (spec §3). SHA is unique within a repo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub repo_id: i64,
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: chrono::DateTime<chrono::Utc>,
    /// Monotone within repo history order; assigned by a reverse-topological
    /// walk at ingestion time (I7).
    pub topological_index: i64,
    pub parent_shas: Vec<String>,
    pub files: Vec<FilePatch>,
    pub atomization_state: AtomizationState,
    pub atomized_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo_id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub merged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub merge_commit_sha: Option<String>,
    pub base_ref: String,
    pub head_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub repo_id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub labels: Vec<String>,
    /// Heuristic: derived from labels ("bug", "type:bug", ...) at ingestion.
    pub is_bug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineEventKind {
    Closed,
    CrossReferenced,
    Merged,
    Referenced,
}

impl TimelineEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::CrossReferenced => "cross-referenced",
            Self::Merged => "merged",
            Self::Referenced => "referenced",
        }
    }
}

/// Source a timeline event points back at — a commit, a PR, or another
/// issue number (GitHub shares the number space; resolved later via
/// [`crate::types::Entity`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    Commit { sha: String },
    Number { number: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub repo_id: i64,
    pub issue_number: i64,
    pub kind: TimelineEventKind,
    pub actor: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_ref: Option<SourceRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Function,
    Method,
    Class,
    Component,
}

impl BlockType {
    /// `type_bonus` term in the QE scoring formula (spec §4.6).
    pub fn type_bonus(&self) -> f64 {
        match self {
            BlockType::Class => 2.0,
            BlockType::Method => 1.0,
            BlockType::Function | BlockType::Component => 0.0,
        }
    }
}

/// Composite identity `(repo, canonical_file_path, block_name)` — I1: line
/// numbers are attributes, never identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeBlockKey {
    pub repo_id: i64,
    pub file_path: String,
    pub block_name: String,
}

impl CodeBlockKey {
    /// Natural-key string used as graph node identity (spec §4.5):
    /// `repo:file_path:block_name`.
    pub fn graph_id(&self) -> String {
        format!("{}:{}:{}", self.repo_id, self.file_path, self.block_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: i64,
    pub key: CodeBlockKey,
    pub block_type: BlockType,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub signature: Option<String>,
    pub first_seen_commit: String,
    pub last_modified_commit: String,
    pub last_modified_time: chrono::DateTime<chrono::Utc>,
    pub original_author: String,
    pub last_modifier: String,
    pub incident_count: u32,
    pub total_modifications: u32,
}

impl CodeBlock {
    /// Days since `last_modified_time`, as of `now` (spec §4.6 "Staleness =
    /// `now - last_modified_at`"). Computed on read rather than stored,
    /// since a persisted staleness value would go stale the moment it's
    /// written.
    pub fn staleness_days(&self, now: chrono::DateTime<chrono::Utc>) -> f64 {
        (now - self.last_modified_time).num_seconds() as f64 / 86_400.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// `(block, commit)` unique (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlockModification {
    pub block_id: i64,
    pub commit_sha: String,
    pub additions: u32,
    pub deletions: u32,
    pub patch_snippet: Option<String>,
    pub kind: ModificationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefAction {
    Fixes,
    Closes,
    Resolves,
    Mentions,
    AssociatedWith,
}

impl RefAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefAction::Fixes => "fixes",
            RefAction::Closes => "closes",
            RefAction::Resolves => "resolves",
            RefAction::Mentions => "mentions",
            RefAction::AssociatedWith => "associated_with",
        }
    }

    /// Whether this action counts as a "fixes"-class claim for the
    /// fixes-over-mentions merge preference (spec §4.3 "Merge & filter").
    pub fn is_fixing(&self) -> bool {
        matches!(self, RefAction::Fixes | RefAction::Closes | RefAction::Resolves)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    CommitExtraction,
    PrExtraction,
    Temporal,
    Timeline,
    SemanticSimilarity,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::CommitExtraction => "commit_extraction",
            DetectionMethod::PrExtraction => "pr_extraction",
            DetectionMethod::Temporal => "temporal",
            DetectionMethod::Timeline => "timeline",
            DetectionMethod::SemanticSimilarity => "semantic_similarity",
        }
    }
}

/// Extraction intermediate (spec §3): a possible relationship between an
/// issue/PR number and a commit, before merge/filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCommitRef {
    pub repo_id: i64,
    pub issue_number: i64,
    pub commit_sha: Option<String>,
    pub pr_number: Option<i64>,
    pub action: RefAction,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    pub extracted_from: String,
    pub evidence: Vec<String>,
}

/// `(block, issue)` unique; confidence floor 0.70 (I4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlockIncident {
    pub block_id: i64,
    pub issue_number: i64,
    pub confidence: f64,
    pub evidence_source: String,
    pub fix_commit_sha: String,
    pub incident_time: chrono::DateTime<chrono::Utc>,
    pub resolution_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// `(block_a, block_b)` with `block_a_id < block_b_id` (I4/T7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlockCoupling {
    pub block_a_id: i64,
    pub block_b_id: i64,
    pub co_change_count: u32,
    pub coupling_rate: f64,
    pub first_co_change: chrono::DateTime<chrono::Utc>,
    pub last_co_change: chrono::DateTime<chrono::Utc>,
}

impl CodeBlockCoupling {
    /// Constructs a coupling row, swapping the pair if necessary to satisfy
    /// the `block_a_id < block_b_id` ordering invariant (T7).
    pub fn ordered(
        a: i64,
        b: i64,
        co_change_count: u32,
        coupling_rate: f64,
        first_co_change: chrono::DateTime<chrono::Utc>,
        last_co_change: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let (block_a_id, block_b_id) = if a < b { (a, b) } else { (b, a) };
        Self {
            block_a_id,
            block_b_id,
            co_change_count,
            coupling_rate,
            first_co_change,
            last_co_change,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamiliarityTier {
    Owner,
    Contributor,
    Visitor,
}

impl FamiliarityTier {
    pub fn from_share(share: f64) -> Self {
        if share >= 0.50 {
            FamiliarityTier::Owner
        } else if share >= 0.10 {
            FamiliarityTier::Contributor
        } else {
            FamiliarityTier::Visitor
        }
    }
}

/// `(block, developer)` mapping (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ownership {
    pub block_id: i64,
    pub developer: String,
    pub edit_count: u32,
    pub last_edit_time: chrono::DateTime<chrono::Utc>,
    pub contribution_share: f64,
    pub familiarity: FamiliarityTier,
}

/// A projected graph node (spec §4.5/§6): natural-key identity, never an
/// internal store row id (§4.5 "never reuse internal store IDs as graph
/// identity").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub repo_id: i64,
    pub natural_key: String,
    pub label: String,
    pub properties: serde_json::Value,
}

/// A projected graph edge (spec §4.5/§6): carries evidence properties
/// (confidence, detection method, rationale, evidence array) per the edge
/// kinds listed in spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub repo_id: i64,
    pub from_key: String,
    pub to_key: String,
    pub rel_type: String,
    pub properties: serde_json::Value,
}

/// GitHub shares one number space between issues and PRs per repo (spec §9).
/// Resolved via [`crate::store::StagingStore::resolve_entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "number", rename_all = "snake_case")]
pub enum Entity {
    Issue(i64),
    PullRequest(i64),
}

impl Entity {
    pub fn number(&self) -> i64 {
        match self {
            Entity::Issue(n) | Entity::PullRequest(n) => *n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coupling_is_always_ordered() {
        let now = chrono::Utc::now();
        let c = CodeBlockCoupling::ordered(42, 7, 3, 0.5, now, now);
        assert!(c.block_a_id < c.block_b_id);
        assert_eq!((c.block_a_id, c.block_b_id), (7, 42));
    }

    #[test]
    fn familiarity_tiers_match_thresholds() {
        assert_eq!(FamiliarityTier::from_share(0.75), FamiliarityTier::Owner);
        assert_eq!(FamiliarityTier::from_share(0.50), FamiliarityTier::Owner);
        assert_eq!(FamiliarityTier::from_share(0.49), FamiliarityTier::Contributor);
        assert_eq!(FamiliarityTier::from_share(0.10), FamiliarityTier::Contributor);
        assert_eq!(FamiliarityTier::from_share(0.09), FamiliarityTier::Visitor);
    }

    #[test]
    fn block_type_bonus_matches_spec() {
        assert_eq!(BlockType::Class.type_bonus(), 2.0);
        assert_eq!(BlockType::Method.type_bonus(), 1.0);
        assert_eq!(BlockType::Function.type_bonus(), 0.0);
    }

    #[test]
    fn atomization_state_roundtrips() {
        for s in [AtomizationState::Pending, AtomizationState::Atomized, AtomizationState::Skipped]
        {
            assert_eq!(AtomizationState::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn graph_id_is_colon_joined_natural_key() {
        let key = CodeBlockKey {
            repo_id: 1,
            file_path: "src/auth.rs".to_string(),
            block_name: "refresh_token".to_string(),
        };
        assert_eq!(key.graph_id(), "1:src/auth.rs:refresh_token");
    }
}
