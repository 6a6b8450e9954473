//! The Query Engine's driving operation (spec §4.6): given `(file_path,
//! optional diff)`, resolve historical paths, collect block evidence
//! (incidents, coupling, ownership), rank by risk score, and return a
//! bounded response.
//!
//! Reads GP first; when graph projection validation reports a warning or
//! failure (<95% match against SS), this degrades to SS-only metric reads
//! (spec §4.6 failure modes, T9) rather than ever inventing evidence.

use std::collections::HashMap;

use chrono::Utc;
use coderisk_core::store::StagingStore;
use coderisk_core::types::CodeBlock;
use coderisk_graph::keys;
use coderisk_graph::projection::{validate_consistency, ConsistencyOutcome};

use crate::error::Result;
use crate::path::{changed_line_ranges, narrow_by_diff, resolve_candidate_paths};
use crate::scoring::risk_score;
use crate::types::{
    BlockEvidence, Consistency, CoupledBlockRef, DeveloperFamiliarity, IncidentSample, Pagination,
    QueryOptions, QueryRequest, QueryResponse, QuerySummary,
};

/// Hard cap on a non-`summary_only` response, per spec §4.6/T8 ("~18 KB
/// JSON"). Kept conservative relative to the spec's ~25k-token figure since
/// JSON bytes are a stricter (smaller) measure than token count.
const MAX_RESPONSE_BYTES: usize = 18 * 1024;
/// Cap for a `summary_only` response (spec §4.6, "< 1 KB payload").
const MAX_SUMMARY_BYTES: usize = 1024;
/// How many sample incidents to include per block regardless of `cap`
/// passed to the store reader — keeps a single incident-heavy block from
/// crowding out the response budget on its own.
const INCIDENT_SAMPLE_CAP: usize = 5;
/// Ownership entries shown per block ("top K" per spec §4.6 output shape).
const OWNERSHIP_TOP_K: usize = 3;

pub fn query(store: &StagingStore, repo_id: i64, request: &QueryRequest) -> Result<QueryResponse> {
    let options = &request.options;
    let now = Utc::now();

    let consistency_report = validate_consistency(store, repo_id)?;
    let consistency = match consistency_report.outcome {
        ConsistencyOutcome::Success => Consistency::Full,
        ConsistencyOutcome::Warning | ConsistencyOutcome::Failure => Consistency::Degraded {
            reason: format!(
                "graph projection match ratio {:.0}% below validation threshold; serving staging-store reads",
                consistency_report.match_ratio * 100.0
            ),
        },
    };
    let use_graph = matches!(consistency, Consistency::Full);

    let candidates = resolve_candidate_paths(
        store,
        repo_id,
        &request.file_path,
        request.repo_root.as_deref(),
    )?;

    let mut seen = HashMap::new();
    let mut blocks: Vec<CodeBlock> = Vec::new();
    for path in &candidates {
        for block in store.list_code_blocks_for_file(repo_id, path)? {
            if seen.insert(block.id, ()).is_none() {
                blocks.push(block);
            }
        }
        // §4.6 path resolution stops at the first candidate that actually
        // has blocks: the current path if non-empty, else the first
        // historical path with any.
        if !blocks.is_empty() {
            break;
        }
    }

    blocks = narrow_by_diff(blocks, request.diff_content.as_deref());

    // Needed to resolve the *other* side of an SS-sourced coupling pair
    // (`list_coupled_blocks` only returns ids); loaded once per query
    // rather than per block.
    let all_blocks_by_id: HashMap<i64, CodeBlock> =
        store.list_code_blocks(repo_id)?.into_iter().map(|b| (b.id, b)).collect();

    let mut evidence: Vec<BlockEvidence> = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let block_key = keys::code_block_key(&block.key.file_path, &block.key.block_name);
        let staleness_days = block.staleness_days(now);

        let (sample_incidents, all_coupled) = if use_graph {
            (graph_incidents(store, repo_id, &block_key)?, graph_coupling(store, repo_id, &block_key)?)
        } else {
            (ss_incidents(store, block.id)?, ss_coupling(store, block.id, &all_blocks_by_id)?)
        };
        // `coupling_partners` in the scoring formula is the true partner
        // count (spec §4.6's "2 x coupling_partners"); `coupled_blocks` is
        // only the display slice, capped separately by `max_coupled_blocks`.
        let coupling_partners = all_coupled.len();
        let mut coupled_blocks = all_coupled;
        coupled_blocks.truncate(options.max_coupled_blocks);

        let developers = store
            .list_ownership_for_block(block.id, OWNERSHIP_TOP_K)?
            .into_iter()
            .map(|o| DeveloperFamiliarity {
                developer: o.developer,
                familiarity: o.familiarity,
                contribution_share: o.contribution_share,
            })
            .collect();

        // Computed unconditionally: `filter_and_rank` ranks every response
        // by this score regardless of whether the caller wants it echoed
        // back, so gating the computation on `include_risk_score` would
        // silently break both filtering (every block reads as score 0) and
        // sorting (every block ties) whenever a caller asks to filter by
        // score without also asking to see it.
        let score = risk_score(block.incident_count, coupling_partners, staleness_days, block.block_type, options.prioritize_recent);

        evidence.push(BlockEvidence {
            block_name: block.key.block_name.clone(),
            block_type: block.block_type,
            file_path: block.key.file_path.clone(),
            incident_count: block.incident_count,
            sample_incidents,
            staleness_days,
            developers,
            coupled_blocks,
            risk_score: Some(score),
        });
    }

    let filtered = filter_and_rank(evidence, options);
    let total_matching = filtered.len();

    let mut truncated = filtered;
    truncated.truncate(options.max_blocks);

    // Strip the score back out of the response payload only now that
    // filtering/ranking (which always needs it) is done, so a caller that
    // didn't ask to see it doesn't pay for it in the response bytes either.
    if !options.include_risk_score {
        for block in &mut truncated {
            block.risk_score = None;
        }
    }

    let response = if options.summary_only {
        summarize(truncated, total_matching, consistency)
    } else {
        let pagination = Pagination {
            returned: truncated.len(),
            total_matching,
            truncated: total_matching > truncated.len(),
        };
        QueryResponse { summary: None, blocks: truncated, pagination: Some(pagination), consistency }
    };

    Ok(enforce_size_cap(response, options.summary_only))
}

fn filter_and_rank(mut blocks: Vec<BlockEvidence>, options: &QueryOptions) -> Vec<BlockEvidence> {
    blocks.retain(|b| {
        if let Some(min) = options.min_risk_score {
            if b.risk_score.map(|s| s < min).unwrap_or(true) {
                return false;
            }
        }
        if let Some(min) = options.min_incidents {
            if b.incident_count < min {
                return false;
            }
        }
        if let Some(min) = options.min_staleness_days {
            if b.staleness_days < min {
                return false;
            }
        }
        true
    });

    blocks.sort_by(|a, b| {
        let sa = a.risk_score.unwrap_or(0.0);
        let sb = b.risk_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    blocks
}

fn summarize(blocks: Vec<BlockEvidence>, total_matching: usize, consistency: Consistency) -> QueryResponse {
    let total_incidents = blocks.iter().map(|b| b.incident_count).sum();
    let max_risk_score =
        blocks.iter().filter_map(|b| b.risk_score).fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |a| a.max(s)))
        });

    QueryResponse {
        summary: Some(QuerySummary { total_blocks: total_matching, total_incidents, max_risk_score }),
        blocks: Vec::new(),
        pagination: None,
        consistency,
    }
}

/// GP-path incidents: walk `(:CodeBlock)-[:WAS_ROOT_CAUSE_IN]->(:Incident)`
/// edges and read the confidence straight off the edge property (spec §6).
fn graph_incidents(store: &StagingStore, repo_id: i64, block_key: &str) -> Result<Vec<IncidentSample>> {
    let edges = store.list_graph_edges_from(repo_id, block_key, "WAS_ROOT_CAUSE_IN")?;
    let mut samples: Vec<IncidentSample> = edges
        .into_iter()
        .filter_map(|e| {
            let issue_number = keys::parse_incident_key(&e.to_key)?;
            let confidence = e.properties.get("confidence")?.as_f64()?;
            Some(IncidentSample { issue_number, confidence })
        })
        .collect();
    samples.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    samples.truncate(INCIDENT_SAMPLE_CAP);
    Ok(samples)
}

fn ss_incidents(store: &StagingStore, block_id: i64) -> Result<Vec<IncidentSample>> {
    Ok(store
        .list_incidents_for_block(block_id, INCIDENT_SAMPLE_CAP)?
        .into_iter()
        .map(|i| IncidentSample { issue_number: i.issue_number, confidence: i.confidence })
        .collect())
}

/// GP-path coupling: walk `(:CodeBlock)-[:CO_CHANGES_WITH]-(:CodeBlock)`
/// edges from either side and recover the partner's identity from its
/// natural key (no id lookup needed, unlike the SS path).
fn graph_coupling(store: &StagingStore, repo_id: i64, block_key: &str) -> Result<Vec<CoupledBlockRef>> {
    let edges = store.list_graph_edges_either(repo_id, block_key, "CO_CHANGES_WITH")?;
    let mut refs: Vec<CoupledBlockRef> = edges
        .into_iter()
        .filter_map(|e| {
            let other_key = if e.from_key == block_key { &e.to_key } else { &e.from_key };
            let (file_path, block_name) = keys::parse_code_block_key(other_key)?;
            let coupling_rate = e.properties.get("rate")?.as_f64()?;
            Some(CoupledBlockRef { block_name, file_path, coupling_rate })
        })
        .collect();
    refs.sort_by(|a, b| b.coupling_rate.partial_cmp(&a.coupling_rate).unwrap_or(std::cmp::Ordering::Equal));
    Ok(refs)
}

fn ss_coupling(
    store: &StagingStore,
    block_id: i64,
    all_blocks_by_id: &HashMap<i64, CodeBlock>,
) -> Result<Vec<CoupledBlockRef>> {
    let pairs = store.list_coupled_blocks(block_id, 1_000_000)?;
    Ok(pairs
        .into_iter()
        .filter_map(|c| {
            let other_id = if c.block_a_id == block_id { c.block_b_id } else { c.block_a_id };
            let other = all_blocks_by_id.get(&other_id)?;
            Some(CoupledBlockRef {
                block_name: other.key.block_name.clone(),
                file_path: other.key.file_path.clone(),
                coupling_rate: c.coupling_rate,
            })
        })
        .collect())
}

/// Enforces T8's size cap by progressively dropping the lowest-ranked
/// blocks (and, failing that, their bulkiest fields) until the serialized
/// response fits. A response already under cap is returned unchanged.
fn enforce_size_cap(mut response: QueryResponse, summary_only: bool) -> QueryResponse {
    let cap = if summary_only { MAX_SUMMARY_BYTES } else { MAX_RESPONSE_BYTES };

    while serde_json::to_vec(&response).map(|b| b.len()).unwrap_or(0) > cap {
        if response.blocks.is_empty() {
            break;
        }
        response.blocks.pop();
        if let Some(p) = &mut response.pagination {
            p.returned = response.blocks.len();
            p.truncated = true;
        }
    }
    response
}

/// Used by `coderisk-orchestrator`'s CLI-facing smoke path and tests that
/// want to sanity-check a diff without a running pipeline.
pub fn diff_touches_any_line(diff_content: &str) -> bool {
    !changed_line_ranges(diff_content).is_empty()
}
