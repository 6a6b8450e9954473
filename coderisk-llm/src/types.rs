//! Request/response shapes for the two LLM-driven extraction tasks (spec
//! §4.2 step 3, §4.3 path P1).

use serde::{Deserialize, Serialize};

/// One file's hunks within a commit, as handed to the atomizer prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHunks {
    /// Canonical path exactly as it appears in the diff — the model is
    /// required to echo this verbatim, never invent it (spec §4.2 step 3).
    pub path: String,
    /// Raw unified-diff hunk text for this file, or `None` when the diff
    /// carried no hunk headers (a whole-file addition).
    pub hunks: Option<String>,
}

/// One commit's submitted diff context for `extract_change_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDiffInput {
    pub sha: String,
    pub message: String,
    pub files: Vec<FileHunks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    AddBlock,
    ModifyBlock,
    DeleteBlock,
    RenameBlock,
    AddImport,
    RemoveImport,
}

/// A single block-level change event (spec §4.2 step 3). The model must
/// echo the commit SHA in each result so the caller can key off it instead
/// of array position (spec §4.2 "critical correctness").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub commit_sha: String,
    pub kind: ChangeEventKind,
    pub file_path: String,
    pub block_name: String,
    pub block_type: Option<String>,
    /// `None` for whole-file operations (spec §4.2 step 2, "entire file").
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    /// Populated only for `AddImport`/`RemoveImport` events.
    pub dependency_path: Option<String>,
    /// Previous block name, populated only for `RenameBlock`.
    pub previous_block_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefActionClaim {
    Fixes,
    Closes,
    Resolves,
    Mentions,
}

/// One text blob the model scans for explicit issue/PR references (a
/// commit message or a PR body) — the unit `extract_references` batches
/// over (spec §4.3 P1, batches of 20).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceExtractionInput {
    /// `commit:<sha>` or `pr:<number>` — the key results are looked up by.
    pub natural_key: String,
    pub text: String,
}

/// A single extracted reference, pre-merge (spec §4.3 P1 output shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReference {
    pub target_id: i64,
    pub action: RefActionClaim,
    pub confidence: f64,
}
