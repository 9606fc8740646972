//! The recursive synchronous build algorithm.
//!
//! A builder's `build` walks the (possibly cyclic) graph of nested builders
//! against one shared [`VisitedSet`]:
//!
//! 1. A directly supplied instance short-circuits without touching the set.
//! 2. A delegating builder adopts the placeholder of its target, which must
//!    already be under construction higher in the call stack.
//! 3. Otherwise the set decides: first entry proceeds to validation; a
//!    re-entry is a cycle and receives the existing placeholder (patching
//!    its own short-circuit slot for later); a finished entry is memoized.
//! 4. Validation records every problem it finds into a fresh [`FieldErrors`];
//!    a non-empty map becomes a Failure and the placeholder stays pending.
//! 5. A clean validation resolves the placeholder, firing queued patch
//!    actions in registration order.
//!
//! Children always build in declaration order and their failures merge into
//! the parent's map in that same order, so repeated builds of a fixed graph
//! report identical results.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use graphsmith_types::identity::{BuilderHandle, BuilderId};

use crate::deferred::BuildRef;
use crate::errors::FieldErrors;
use crate::outcome::{BuildFailure, BuildResult};
use crate::visited::{Revisit, VisitedSet};

// ---------------------------------------------------------------------------
// BuilderCore
// ---------------------------------------------------------------------------

/// Bookkeeping every builder embeds: identity, label, the short-circuit
/// instance slot, and an optional delegation target.
///
/// The slot serves two masters. Callers can `supply` an already-available
/// instance up front; and when a builder is re-entered inside a cycle, the
/// engine patches the slot with the eventual instance so later invocations
/// short-circuit to it.
pub struct BuilderCore<T> {
    handle: BuilderHandle,
    slot: Rc<RefCell<Option<Rc<T>>>>,
    adopted: RefCell<Option<BuilderHandle>>,
}

impl<T> BuilderCore<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            handle: BuilderHandle::new(label),
            slot: Rc::new(RefCell::new(None)),
            adopted: RefCell::new(None),
        }
    }

    pub fn handle(&self) -> &BuilderHandle {
        &self.handle
    }

    pub fn id(&self) -> BuilderId {
        self.handle.id
    }

    pub fn label(&self) -> &str {
        &self.handle.label
    }

    /// Resolve this builder directly to an already-available instance.
    pub fn supply(&self, instance: T) {
        self.supply_shared(Rc::new(instance));
    }

    pub fn supply_shared(&self, instance: Rc<T>) {
        *self.slot.borrow_mut() = Some(instance);
    }

    pub fn supplied(&self) -> Option<Rc<T>> {
        self.slot.borrow().clone()
    }

    /// Adopt the eventual instance of another builder with the same target.
    ///
    /// Valid only while the target is being built higher in the call stack
    /// of the same invocation; building a delegating builder whose target
    /// was never entered is a programming error.
    pub fn adopt(&self, target: &BuilderCore<T>) {
        *self.adopted.borrow_mut() = Some(target.handle.clone());
    }

    pub(crate) fn adopted(&self) -> Option<BuilderHandle> {
        self.adopted.borrow().clone()
    }

    pub(crate) fn slot(&self) -> Rc<RefCell<Option<Rc<T>>>> {
        Rc::clone(&self.slot)
    }
}

impl<T> fmt::Debug for BuilderCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCore")
            .field("handle", &self.handle)
            .field("supplied", &self.slot.borrow().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Visited-set protocol (shared by the sync and async algorithms)
// ---------------------------------------------------------------------------

/// Outcome of consulting the visited set before validation.
pub(crate) enum Prelude<T> {
    /// The visit is answered without running validation.
    Done(BuildResult<T>),
    /// First entry: proceed to validation with this fresh placeholder.
    Proceed(Rc<BuildRef<T>>),
}

/// Steps 1-3 of the algorithm: short-circuit, delegation, then the
/// check-then-insert against the visited set. No suspension point may ever
/// sit inside this function.
pub(crate) fn enter_or_reuse<T: 'static>(
    core: &BuilderCore<T>,
    visited: &mut VisitedSet,
) -> Prelude<T> {
    let handle = core.handle();

    if let Some(instance) = core.supplied() {
        tracing::debug!(builder = %handle.label, "returning directly supplied instance");
        return Prelude::Done(BuildResult::Success(BuildRef::resolved(instance)));
    }

    if let Some(target) = core.adopted() {
        return Prelude::Done(adopt_outcome::<T>(handle, &target, visited));
    }

    match visited.revisit::<T>(handle) {
        Revisit::Pending(placeholder) => {
            if placeholder.is_resolved() {
                return Prelude::Done(BuildResult::Success(placeholder));
            }
            // Cycle: hand the placeholder up the stack and arrange for our
            // own slot to learn the instance once it exists.
            let slot = core.slot();
            placeholder.on_resolve(move |instance| {
                *slot.borrow_mut() = Some(Rc::clone(instance));
            });
            tracing::debug!(builder = %handle.label, "cycle detected; handing out placeholder");
            Prelude::Done(BuildResult::Success(placeholder))
        }
        Revisit::Finished(result) => {
            tracing::debug!(builder = %handle.label, "returning memoized result");
            Prelude::Done(result)
        }
        Revisit::Absent => {
            let placeholder = visited.enter::<T>(handle);
            tracing::debug!(builder = %handle.label, id = %handle.id, "entered builder");
            Prelude::Proceed(placeholder)
        }
    }
}

fn adopt_outcome<T: 'static>(
    who: &BuilderHandle,
    target: &BuilderHandle,
    visited: &VisitedSet,
) -> BuildResult<T> {
    match visited.revisit::<T>(target) {
        Revisit::Absent => panic!(
            "builder '{}' delegates to '{}', which was never entered in this build invocation",
            who.label, target.label
        ),
        Revisit::Pending(placeholder) => BuildResult::Success(placeholder),
        Revisit::Finished(result) => result,
    }
}

/// Steps 5-6: turn the validation outcome into a finished, memoized result.
pub(crate) fn seal<T: 'static>(
    handle: &BuilderHandle,
    placeholder: Rc<BuildRef<T>>,
    errors: FieldErrors,
    produced: Option<T>,
    visited: &mut VisitedSet,
) -> BuildResult<T> {
    if !errors.is_empty() {
        let pending = placeholder.pending_patches();
        if pending > 0 {
            tracing::warn!(
                builder = %handle.label,
                pending,
                "builder failed; placeholder left unresolved with pending patch actions"
            );
        }
        let failure = Rc::new(BuildFailure::from_errors(
            handle.clone(),
            errors,
            visited.snapshot(),
        ));
        let result = BuildResult::Failure(failure);
        visited.finish(handle, &result);
        return result;
    }

    let Some(value) = produced else {
        panic!(
            "builder '{}' recorded no causes but produced no instance",
            handle.label
        );
    };
    placeholder.resolve(Rc::new(value));
    let result = BuildResult::Success(placeholder);
    visited.finish(handle, &result);
    result
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

/// A synchronous builder in an object graph.
///
/// Implementors supply identity bookkeeping via [`BuilderCore`] and their
/// own validation/instantiation in `construct`; the provided `build` methods
/// run the engine's visited-set protocol around it.
///
/// `construct` must record every problem it finds into `errors` and keep
/// going -- causes are aggregated, not short-circuited -- and must build its
/// child builders against the `visited` set it was given.
pub trait GraphBuilder {
    type Target: 'static;

    fn core(&self) -> &BuilderCore<Self::Target>;

    /// Validate configured fields and, when they hold up, produce the
    /// instance. Returning `None` with an empty error map is a programming
    /// error.
    fn construct(
        &self,
        visited: &mut VisitedSet,
        errors: &mut FieldErrors,
    ) -> Option<Self::Target>;

    /// Root entry point: build against a fresh visited set.
    fn build(&self) -> BuildResult<Self::Target> {
        let mut visited = VisitedSet::new();
        self.build_with(&mut visited)
    }

    /// Build against the shared visited set of an enclosing invocation.
    fn build_with(&self, visited: &mut VisitedSet) -> BuildResult<Self::Target> {
        let placeholder = match enter_or_reuse(self.core(), visited) {
            Prelude::Done(result) => return result,
            Prelude::Proceed(placeholder) => placeholder,
        };

        let handle = self.core().handle().clone();
        let mut errors = FieldErrors::new();
        let produced = self.construct(visited, &mut errors);

        seal(&handle, placeholder, errors, produced, visited)
    }
}

// ---------------------------------------------------------------------------
// Child helpers
// ---------------------------------------------------------------------------

/// A successfully built child, as seen by its parent.
pub enum ChildValue<T> {
    /// The instance exists now.
    Ready(Rc<T>),
    /// The child sits inside an unresolved cycle; register a patch action
    /// on the cell to receive the instance later.
    Deferred(Rc<BuildRef<T>>),
}

impl<T> ChildValue<T> {
    pub fn ready(&self) -> Option<&Rc<T>> {
        match self {
            Self::Ready(instance) => Some(instance),
            Self::Deferred(_) => None,
        }
    }
}

/// Build every child against the same visited set, in declaration order,
/// collecting per-child results.
pub fn build_each<T: 'static>(
    children: &[Rc<dyn GraphBuilder<Target = T>>],
    visited: &mut VisitedSet,
) -> Vec<BuildResult<T>> {
    children
        .iter()
        .map(|child| child.build_with(visited))
        .collect()
}

/// Append every failed result's causes into the parent's map under one key,
/// preserving input order.
pub fn absorb_failures<T>(key: &str, results: &[BuildResult<T>], errors: &mut FieldErrors) {
    for result in results {
        if let BuildResult::Failure(failure) = result {
            for cause in failure.causes() {
                errors.record(key, cause.clone());
            }
        }
    }
}

/// Build a single child for a named field.
///
/// On failure, the child's causes land in `errors` under `key` and `None`
/// comes back; the parent should finish validating its remaining fields
/// before giving up.
pub fn require_child<T: 'static>(
    key: &str,
    child: &dyn GraphBuilder<Target = T>,
    visited: &mut VisitedSet,
    errors: &mut FieldErrors,
) -> Option<ChildValue<T>> {
    match child.build_with(visited) {
        BuildResult::Success(cell) => match cell.get() {
            Some(instance) => Some(ChildValue::Ready(instance)),
            None => Some(ChildValue::Deferred(cell)),
        },
        BuildResult::Failure(failure) => {
            for cause in failure.causes() {
                errors.record(key, cause.clone());
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
