//! SHA-keyed batch result mapping.
//!
//! The single most important correctness fix this pipeline makes over a
//! naive implementation: LLM batch calls (commit atomization, reference
//! extraction) must never be zipped back onto their inputs by array index.
//! A dropped or reordered item in the model's response silently
//! misattributes every later item onto the wrong commit. `BatchMap` forces
//! every batch result through an explicit key lookup instead.

use std::collections::HashMap;

/// Maps a batch's natural keys (commit SHAs, issue numbers, file paths —
/// whatever the batch is keyed on) to extraction results, and refuses to
/// let the caller treat the result set as an ordered list.
#[derive(Debug, Clone, Default)]
pub struct BatchMap<K, V> {
    entries: HashMap<K, V>,
    requested: Vec<K>,
}

impl<K, V> BatchMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    /// Start a batch, recording the keys that were actually requested so
    /// `missing()` can report LLM omissions distinctly from absent input.
    pub fn new(requested: impl IntoIterator<Item = K>) -> Self {
        Self { entries: HashMap::new(), requested: requested.into_iter().collect() }
    }

    /// Record a result against its key. A second insert for the same key
    /// overwrites the first — callers that care about duplicate responses
    /// should check `contains` before inserting.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys that were requested but never received a result — the model
    /// dropped them from its batch response.
    pub fn missing(&self) -> Vec<K> {
        self.requested.iter().filter(|k| !self.entries.contains_key(k)).cloned().collect()
    }

    /// Consumes the map, returning `(key, value)` pairs in no particular
    /// order. Deliberately not `IntoIterator` with index semantics — this
    /// name exists to make callers think about ordering before they use it.
    pub fn into_pairs(self) -> Vec<(K, V)> {
        self.entries.into_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}
