//! A deterministic fixture client for tests: results are supplied up front
//! and matched strictly by natural key, so fixtures can exercise the
//! SHA-keyed matching discipline (spec §9, S3) without a network call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coderisk_core::batch::BatchMap;

use crate::error::Result;
use crate::types::{ChangeEvent, CommitDiffInput, ExtractedReference, ReferenceExtractionInput};
use crate::LlmClient;

/// Canned results keyed by natural key. A key with no entry is simply
/// absent from the returned `BatchMap` — simulating the model dropping it,
/// exactly as `BatchMap::missing()` expects callers to handle.
#[derive(Debug, Default)]
pub struct FixtureLlmClient {
    change_events: Mutex<HashMap<String, Vec<ChangeEvent>>>,
    references: Mutex<HashMap<String, Vec<ExtractedReference>>>,
}

impl FixtureLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_events(self, sha: impl Into<String>, events: Vec<ChangeEvent>) -> Self {
        self.change_events.lock().unwrap().insert(sha.into(), events);
        self
    }

    pub fn with_references(self, key: impl Into<String>, refs: Vec<ExtractedReference>) -> Self {
        self.references.lock().unwrap().insert(key.into(), refs);
        self
    }
}

#[async_trait]
impl LlmClient for FixtureLlmClient {
    async fn extract_change_events(
        &self,
        batch: &[CommitDiffInput],
    ) -> Result<BatchMap<String, Vec<ChangeEvent>>> {
        let table = self.change_events.lock().unwrap();
        let mut map = BatchMap::new(batch.iter().map(|c| c.sha.clone()));
        for commit in batch {
            if let Some(events) = table.get(&commit.sha) {
                map.insert(commit.sha.clone(), events.clone());
            }
        }
        Ok(map)
    }

    async fn extract_references(
        &self,
        batch: &[ReferenceExtractionInput],
    ) -> Result<BatchMap<String, Vec<ExtractedReference>>> {
        let table = self.references.lock().unwrap();
        let mut map = BatchMap::new(batch.iter().map(|r| r.natural_key.clone()));
        for input in batch {
            if let Some(refs) = table.get(&input.natural_key) {
                map.insert(input.natural_key.clone(), refs.clone());
            }
        }
        Ok(map)
    }
}
