//! Request/response shapes for the Query Engine (spec §4.6).

use coderisk_core::types::{BlockType, FamiliarityTier};
use serde::{Deserialize, Serialize};

fn default_max_blocks() -> usize {
    20
}

fn default_max_coupled_blocks() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub max_blocks: usize,
    pub max_coupled_blocks: usize,
    pub min_risk_score: Option<f64>,
    pub min_incidents: Option<u32>,
    pub min_staleness_days: Option<f64>,
    pub prioritize_recent: bool,
    pub include_risk_score: bool,
    pub summary_only: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_blocks: default_max_blocks(),
            max_coupled_blocks: default_max_coupled_blocks(),
            min_risk_score: None,
            min_incidents: None,
            min_staleness_days: None,
            prioritize_recent: false,
            include_risk_score: true,
            summary_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub file_path: String,
    pub repo_root: Option<String>,
    pub diff_content: Option<String>,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSample {
    pub issue_number: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperFamiliarity {
    pub developer: String,
    pub familiarity: FamiliarityTier,
    pub contribution_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledBlockRef {
    pub block_name: String,
    pub file_path: String,
    pub coupling_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEvidence {
    pub block_name: String,
    pub block_type: BlockType,
    pub file_path: String,
    pub incident_count: u32,
    pub sample_incidents: Vec<IncidentSample>,
    pub staleness_days: f64,
    pub developers: Vec<DeveloperFamiliarity>,
    pub coupled_blocks: Vec<CoupledBlockRef>,
    pub risk_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub total_blocks: usize,
    pub total_incidents: u32,
    pub max_risk_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub returned: usize,
    pub total_matching: usize,
    pub truncated: bool,
}

/// Whether the response was served from the read-optimized graph or
/// degraded to staging-store-only reads (spec §4.6 failure modes, T9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Consistency {
    Full,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<QuerySummary>,
    pub blocks: Vec<BlockEvidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub consistency: Consistency,
}
