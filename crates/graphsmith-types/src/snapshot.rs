use serde::{Deserialize, Serialize};

use crate::identity::BuilderHandle;

/// Observable state of an in-progress placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderStatus {
    /// Whether the eventual instance has arrived.
    pub resolved: bool,
    /// Patch actions still waiting on the instance.
    pub pending_patches: usize,
}

/// Status of one visited-set entry at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryStatus {
    /// Entered, construction still underway (or abandoned mid-cycle).
    Building(PlaceholderStatus),
    /// Finished with a produced instance.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

/// One builder's row in a [`VisitedSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub handle: BuilderHandle,
    pub status: EntryStatus,
}

/// Immutable picture of the visited set at the moment a failure was made.
///
/// Entries appear in first-entry order. The snapshot is the only part of a
/// build invocation's bookkeeping that outlives the invocation, and it never
/// mutates after capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl VisitedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up the status recorded for a builder, by label.
    pub fn status_of(&self, label: &str) -> Option<&EntryStatus> {
        self.entries
            .iter()
            .find(|e| e.handle.label == label)
            .map(|e| &e.status)
    }
}
