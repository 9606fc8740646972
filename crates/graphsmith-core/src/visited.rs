//! The per-invocation visited set: cycle detection and memoization ledger.
//!
//! Exactly one `VisitedSet` exists per root build call. It is threaded by
//! mutation through every recursive child build, including across siblings,
//! so a shared dependency is entered once and its finished result re-read on
//! every later visit. Once a builder's identity is present it is never
//! re-entered with fresh logic.
//!
//! Entries are type-erased (`Rc<dyn Any>`) because one graph mixes builders
//! of different target types; each entry carries a monomorphized probe so
//! snapshots can report placeholder state without knowing the type.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use graphsmith_types::identity::{BuilderHandle, BuilderId};
use graphsmith_types::snapshot::{EntryStatus, PlaceholderStatus, SnapshotEntry, VisitedSnapshot};

use crate::deferred::BuildRef;
use crate::outcome::BuildResult;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

enum VisitEntry {
    /// Entered, construction underway. Holds `Rc<BuildRef<T>>` erased.
    Building {
        placeholder: Rc<dyn Any>,
        probe: Box<dyn Fn() -> PlaceholderStatus>,
    },
    /// Finished. Holds a `BuildResult<T>` erased; success and failure are
    /// both memoized.
    Finished { result: Box<dyn Any>, failed: bool },
}

/// What a re-entry finds for a builder identity.
pub(crate) enum Revisit<T> {
    Absent,
    /// The existing placeholder; may or may not have resolved yet.
    Pending(Rc<BuildRef<T>>),
    /// The memoized finished result.
    Finished(BuildResult<T>),
}

// ---------------------------------------------------------------------------
// VisitedSet
// ---------------------------------------------------------------------------

/// Map from builder identity to in-progress placeholder or finished result,
/// scoped to one build invocation.
#[derive(Default)]
pub struct VisitedSet {
    entries: HashMap<BuilderId, VisitEntry>,
    /// First-entry order, for deterministic snapshots.
    order: Vec<BuilderHandle>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: BuilderId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Record first entry of a builder and hand back its fresh placeholder.
    ///
    /// Single uninterrupted check-then-insert; entering an identity twice is
    /// a programming error and panics.
    pub(crate) fn enter<T: 'static>(&mut self, handle: &BuilderHandle) -> Rc<BuildRef<T>> {
        if self.entries.contains_key(&handle.id) {
            panic!(
                "builder '{}' entered twice in one invocation; re-entries must go through lookup",
                handle.label
            );
        }
        let placeholder: Rc<BuildRef<T>> = BuildRef::new();
        let probe_target = Rc::clone(&placeholder);
        self.entries.insert(
            handle.id,
            VisitEntry::Building {
                placeholder: Rc::clone(&placeholder) as Rc<dyn Any>,
                probe: Box::new(move || probe_target.status()),
            },
        );
        self.order.push(handle.clone());
        placeholder
    }

    /// Look up what this invocation already knows about a builder identity.
    ///
    /// Panics if the entry exists but was recorded for a different target
    /// type: identities are minted per builder, so a mismatch is caller
    /// misuse, not data.
    pub(crate) fn revisit<T: 'static>(&self, handle: &BuilderHandle) -> Revisit<T> {
        match self.entries.get(&handle.id) {
            None => Revisit::Absent,
            Some(VisitEntry::Building { placeholder, .. }) => {
                let typed = Rc::clone(placeholder)
                    .downcast::<BuildRef<T>>()
                    .unwrap_or_else(|_| {
                        panic!(
                            "builder '{}' revisited with a different target type",
                            handle.label
                        )
                    });
                Revisit::Pending(typed)
            }
            Some(VisitEntry::Finished { result, .. }) => {
                let typed = result
                    .downcast_ref::<BuildResult<T>>()
                    .unwrap_or_else(|| {
                        panic!(
                            "builder '{}' revisited with a different target type",
                            handle.label
                        )
                    });
                Revisit::Finished(typed.clone())
            }
        }
    }

    /// Replace a builder's placeholder entry with its finished result.
    pub(crate) fn finish<T: 'static>(&mut self, handle: &BuilderHandle, result: &BuildResult<T>) {
        let failed = result.is_failure();
        self.entries.insert(
            handle.id,
            VisitEntry::Finished {
                result: Box::new(result.clone()),
                failed,
            },
        );
    }

    /// Immutable picture of every entry, in first-entry order.
    pub fn snapshot(&self) -> VisitedSnapshot {
        let entries = self
            .order
            .iter()
            .filter_map(|handle| {
                let status = match self.entries.get(&handle.id)? {
                    VisitEntry::Building { probe, .. } => EntryStatus::Building(probe()),
                    VisitEntry::Finished { failed: true, .. } => EntryStatus::Failed,
                    VisitEntry::Finished { failed: false, .. } => EntryStatus::Succeeded,
                };
                Some(SnapshotEntry {
                    handle: handle.clone(),
                    status,
                })
            })
            .collect();
        VisitedSnapshot { entries }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_then_revisit_pending() {
        let mut visited = VisitedSet::new();
        let handle = BuilderHandle::new("a");

        let placeholder = visited.enter::<i32>(&handle);
        assert!(visited.contains(handle.id));

        match visited.revisit::<i32>(&handle) {
            Revisit::Pending(cell) => assert!(Rc::ptr_eq(&cell, &placeholder)),
            _ => panic!("expected Revisit::Pending"),
        }
    }

    #[test]
    fn test_finish_memoizes_identical_result() {
        let mut visited = VisitedSet::new();
        let handle = BuilderHandle::new("a");

        let placeholder = visited.enter::<i32>(&handle);
        placeholder.resolve(Rc::new(5));
        let result = BuildResult::Success(Rc::clone(&placeholder));
        visited.finish(&handle, &result);

        match visited.revisit::<i32>(&handle) {
            Revisit::Finished(memo) => {
                assert!(Rc::ptr_eq(&memo.handle(), &placeholder));
            }
            _ => panic!("expected Revisit::Finished"),
        }
    }

    #[test]
    fn test_unknown_identity_is_absent() {
        let visited = VisitedSet::new();
        let handle = BuilderHandle::new("ghost");
        assert!(matches!(
            visited.revisit::<i32>(&handle),
            Revisit::Absent
        ));
    }

    #[test]
    fn test_snapshot_preserves_first_entry_order() {
        let mut visited = VisitedSet::new();
        let a = BuilderHandle::new("a");
        let b = BuilderHandle::new("b");

        let cell_a = visited.enter::<i32>(&a);
        let _cell_b = visited.enter::<i32>(&b);
        cell_a.resolve(Rc::new(1));
        visited.finish(&a, &BuildResult::Success(cell_a));

        let snapshot = visited.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.entries[0].handle.label, "a");
        assert_eq!(snapshot.entries[0].status, EntryStatus::Succeeded);
        assert_eq!(
            snapshot.entries[1].status,
            EntryStatus::Building(PlaceholderStatus {
                resolved: false,
                pending_patches: 0
            })
        );
    }

    #[test]
    #[should_panic(expected = "entered twice")]
    fn test_double_enter_panics() {
        let mut visited = VisitedSet::new();
        let handle = BuilderHandle::new("a");
        let _first = visited.enter::<i32>(&handle);
        let _second = visited.enter::<i32>(&handle);
    }

    #[test]
    #[should_panic(expected = "different target type")]
    fn test_type_mismatch_panics() {
        let mut visited = VisitedSet::new();
        let handle = BuilderHandle::new("a");
        let _cell = visited.enter::<i32>(&handle);
        let _ = visited.revisit::<String>(&handle);
    }
}
