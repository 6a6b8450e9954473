//! P1: explicit extraction via the LLM (spec §4.3).

use coderisk_core::types::{DetectionMethod, IssueCommitRef, RefAction};
use coderisk_llm::batch::{chunk, with_retry, DEFAULT_BATCH_SIZE};
use coderisk_llm::types::{RefActionClaim, ReferenceExtractionInput};
use coderisk_llm::LlmClient;

use crate::error::Result;

fn claim_to_action(claim: RefActionClaim) -> RefAction {
    match claim {
        RefActionClaim::Fixes => RefAction::Fixes,
        RefActionClaim::Closes => RefAction::Closes,
        RefActionClaim::Resolves => RefAction::Resolves,
        RefActionClaim::Mentions => RefAction::Mentions,
    }
}

/// One text blob submitted to P1, tagged with how to attribute a result
/// back onto a commit or PR row.
#[derive(Clone)]
pub struct Source {
    pub natural_key: String,
    pub text: String,
    pub commit_sha: Option<String>,
    pub pr_number: Option<i64>,
    pub method: DetectionMethod,
}

/// Runs P1 over every source, returning raw (pre-merge) refs keyed by the
/// extracted `target_id` as `issue_number` (spec §9's shared number space
/// means this may later resolve to a PR rather than an Issue — entity
/// resolution happens at merge time).
pub async fn extract(repo_id: i64, llm: &dyn LlmClient, sources: &[Source]) -> Result<Vec<IssueCommitRef>> {
    let mut refs = Vec::new();

    for batch in chunk(sources, DEFAULT_BATCH_SIZE) {
        let inputs: Vec<ReferenceExtractionInput> = batch
            .iter()
            .map(|s| ReferenceExtractionInput { natural_key: s.natural_key.clone(), text: s.text.clone() })
            .collect();

        let result = with_retry("issue_linker_p1", || llm.extract_references(&inputs)).await?;

        for source in &batch {
            let Some(claims) = result.get(&source.natural_key) else { continue };
            for claim in claims {
                refs.push(IssueCommitRef {
                    repo_id,
                    issue_number: claim.target_id,
                    commit_sha: source.commit_sha.clone(),
                    pr_number: source.pr_number,
                    action: claim_to_action(claim.action),
                    confidence: claim.confidence.clamp(0.0, 0.98),
                    detection_method: source.method,
                    extracted_from: source.natural_key.clone(),
                    evidence: vec![source.text.clone()],
                });
            }
        }
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_llm::fixture::FixtureLlmClient;
    use coderisk_llm::types::ExtractedReference;

    #[tokio::test]
    async fn extract_keys_results_by_natural_key_not_position() {
        let llm = FixtureLlmClient::new().with_references(
            "commit:c2",
            vec![ExtractedReference { target_id: 127, action: RefActionClaim::Fixes, confidence: 0.95 }],
        );
        let sources = vec![
            Source {
                natural_key: "commit:c1".into(),
                text: "unrelated".into(),
                commit_sha: Some("c1".into()),
                pr_number: None,
                method: DetectionMethod::CommitExtraction,
            },
            Source {
                natural_key: "commit:c2".into(),
                text: "fixes #127".into(),
                commit_sha: Some("c2".into()),
                pr_number: None,
                method: DetectionMethod::CommitExtraction,
            },
        ];

        let refs = extract(1, &llm, &sources).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].commit_sha.as_deref(), Some("c2"));
        assert_eq!(refs[0].issue_number, 127);
    }
}
