//! Failure aggregation across one validation pass.
//!
//! `FieldErrors` maps a field key to the ordered list of causes recorded
//! against it. Recording appends, never overwrites, and never fails, so a
//! single validation pass can report every problem it finds ("name is
//! missing" and "age is missing" and the summary cause) instead of stopping
//! at the first.

use std::collections::HashMap;

use graphsmith_types::cause::BuildCause;

/// Append-accumulating, key-ordered map from field key to recorded causes.
///
/// Keys iterate in first-insertion order; each key's causes iterate in
/// recording order. One map is created fresh per build invocation's
/// validation phase and merged into a failure if non-empty.
#[derive(Debug, Clone, Default)]
pub struct FieldErrors {
    /// (key, causes) pairs in first-insertion order.
    entries: Vec<(String, Vec<BuildCause>)>,
    /// Key -> index into `entries`.
    index: HashMap<String, usize>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cause under a key, creating the key's list on first use.
    pub fn record(&mut self, key: impl Into<String>, cause: BuildCause) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.push(cause),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, vec![cause]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of recorded causes across all keys.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, causes)| causes.len()).sum()
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Causes recorded under a key, in recording order.
    pub fn causes_for(&self, key: &str) -> &[BuildCause] {
        self.index
            .get(key)
            .map(|&i| self.entries[i].1.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate keys in first-insertion order with their causes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BuildCause])> {
        self.entries
            .iter()
            .map(|(key, causes)| (key.as_str(), causes.as_slice()))
    }

    /// All causes flattened in key order, each key's causes in record order.
    pub fn flatten(&self) -> Vec<BuildCause> {
        self.entries
            .iter()
            .flat_map(|(_, causes)| causes.iter().cloned())
            .collect()
    }

    /// Render the keyed causes as JSON for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, causes) in self.iter() {
            let rendered: Vec<String> = causes.iter().map(|c| c.to_string()).collect();
            map.insert(key.to_string(), serde_json::json!(rendered));
        }
        serde_json::Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
