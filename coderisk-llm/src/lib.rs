//! The opaque LLM capability (spec.md §1: "the language-model provider
//! client itself" is an external collaborator; SPEC_FULL.md's `coderisk-llm`
//! entry). This crate ships:
//!
//! - [`LlmClient`]: a provider-agnostic async trait for the two extraction
//!   tasks the pipeline needs — commit atomization (spec §4.2) and issue
//!   reference extraction (spec §4.3).
//! - [`batch`]: a batching/rate-limiting harness generic over any
//!   implementer, so the SHA-keyed-not-positional discipline (spec §9) lives
//!   in one place instead of being re-derived per call site.
//! - [`NullLlmClient`] and [`fixture::FixtureLlmClient`] for callers and
//!   tests that don't have a concrete provider wired up.

pub mod batch;
pub mod error;
pub mod fixture;
pub mod types;

use async_trait::async_trait;
use coderisk_core::batch::BatchMap;

use crate::error::Result;
use crate::types::{ChangeEvent, CommitDiffInput, ExtractedReference, ReferenceExtractionInput};

/// A provider-agnostic LLM capability. Concrete providers (calls to an
/// Anthropic/OpenAI-compatible endpoint) live outside this core per spec.md
/// §1; this trait is the seam an external implementer plugs into.
///
/// Both methods are keyed-batch operations: the natural key (commit SHA,
/// issue number) is the only way callers may associate a result with its
/// input (spec §9 "arrays of callbacks" -> SHA-keyed maps).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Extract block-level change events from a batch of commit diffs
    /// (spec §4.2 step 3). Returns one entry per commit SHA that the model
    /// actually emitted a result for; a SHA absent from the result was
    /// either dropped by the model or never echoed back correctly.
    async fn extract_change_events(
        &self,
        batch: &[CommitDiffInput],
    ) -> Result<BatchMap<String, Vec<ChangeEvent>>>;

    /// Extract explicit issue/PR/commit references from text (spec §4.3
    /// path P1). Keyed by the input's `natural_key` (commit SHA or
    /// `pr:<number>`).
    async fn extract_references(
        &self,
        batch: &[ReferenceExtractionInput],
    ) -> Result<BatchMap<String, Vec<ExtractedReference>>>;
}

/// A no-op client for callers that run the pipeline without an LLM
/// configured (e.g. the temporal-only and timeline-only IL paths still
/// function without P1). Every batch call returns an empty map — every
/// requested key shows up in `BatchMap::missing()`, which is the correct,
/// honest answer for "no extraction happened."
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLlmClient;

#[async_trait]
impl LlmClient for NullLlmClient {
    async fn extract_change_events(
        &self,
        batch: &[CommitDiffInput],
    ) -> Result<BatchMap<String, Vec<ChangeEvent>>> {
        Ok(BatchMap::new(batch.iter().map(|c| c.sha.clone())))
    }

    async fn extract_references(
        &self,
        batch: &[ReferenceExtractionInput],
    ) -> Result<BatchMap<String, Vec<ExtractedReference>>> {
        Ok(BatchMap::new(batch.iter().map(|r| r.natural_key.clone())))
    }
}
