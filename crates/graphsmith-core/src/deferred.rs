//! Deferred references: placeholders for instances that do not exist yet.
//!
//! A `BuildRef<T>` is created the instant a builder is first entered, before
//! its validation runs. Dependents inside a cycle receive the placeholder
//! instead of a finished instance and register patch actions against it;
//! when the instance finally arrives, the pending actions run once each in
//! registration order. A placeholder whose builder fails validation simply
//! never resolves, which callers can observe.

use std::cell::RefCell;
use std::rc::Rc;

use graphsmith_types::snapshot::PlaceholderStatus;

type PatchAction<T> = Box<dyn FnOnce(&Rc<T>)>;

enum RefState<T> {
    Pending { patches: Vec<PatchAction<T>> },
    Resolved(Rc<T>),
}

/// Two-phase cell holding the eventual instance of a builder under
/// construction.
///
/// Single-threaded by design: one build invocation owns the cell and every
/// mutation happens between suspension points, so a `RefCell` suffices.
pub struct BuildRef<T> {
    state: RefCell<RefState<T>>,
}

impl<T> BuildRef<T> {
    /// A placeholder with no instance yet.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(RefState::Pending {
                patches: Vec::new(),
            }),
        })
    }

    /// A cell that already holds its instance (short-circuit builds).
    pub fn resolved(value: Rc<T>) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(RefState::Resolved(value)),
        })
    }

    /// Register an action to run once the instance is available.
    ///
    /// If the instance is already present the action runs immediately;
    /// otherwise it queues in registration order. An action never runs more
    /// than once and never gets lost.
    pub fn on_resolve(&self, action: impl FnOnce(&Rc<T>) + 'static) {
        let value = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                RefState::Pending { patches } => {
                    patches.push(Box::new(action));
                    return;
                }
                RefState::Resolved(value) => Rc::clone(value),
            }
        };
        action(&value);
    }

    /// Set the instance and run every pending patch action in order.
    ///
    /// Resolving twice is a programming error and panics. The cell flips to
    /// `Resolved` before any action runs, so an action that registers a new
    /// action sees the resolved state and runs it immediately.
    pub fn resolve(&self, value: Rc<T>) {
        let pending = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                RefState::Resolved(_) => {
                    panic!("placeholder resolved twice; resolve() must be called at most once")
                }
                RefState::Pending { patches } => {
                    let pending = std::mem::take(patches);
                    *state = RefState::Resolved(Rc::clone(&value));
                    pending
                }
            }
        };
        tracing::debug!(patches = pending.len(), "placeholder resolved");
        for action in pending {
            action(&value);
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.borrow(), RefState::Resolved(_))
    }

    /// The instance, if it has arrived.
    pub fn get(&self) -> Option<Rc<T>> {
        match &*self.state.borrow() {
            RefState::Resolved(value) => Some(Rc::clone(value)),
            RefState::Pending { .. } => None,
        }
    }

    /// Patch actions still waiting on the instance.
    pub fn pending_patches(&self) -> usize {
        match &*self.state.borrow() {
            RefState::Pending { patches } => patches.len(),
            RefState::Resolved(_) => 0,
        }
    }

    pub fn status(&self) -> PlaceholderStatus {
        PlaceholderStatus {
            resolved: self.is_resolved(),
            pending_patches: self.pending_patches(),
        }
    }
}

impl<T> std::fmt::Debug for BuildRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("BuildRef")
            .field("resolved", &status.resolved)
            .field("pending_patches", &status.pending_patches)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
