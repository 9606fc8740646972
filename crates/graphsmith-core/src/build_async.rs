//! The asynchronous build algorithm.
//!
//! Same visited-set protocol as [`crate::build`], except that validation and
//! instantiation may suspend while child builds are awaited. Children are
//! awaited one at a time in declaration order -- nothing runs in parallel
//! inside one invocation -- so every check-then-insert against the visited
//! set stays a single uninterrupted section and needs no lock.
//!
//! Futures are `LocalBoxFuture`s: the engine is `Rc`-based and owned by one
//! task, and boxing is what lets a cyclic graph recurse without an
//! infinitely sized future type.
//!
//! A cancellation token passed to the root call reaches every child build.
//! A builder observing cancellation stops and surfaces a cancellation-kind
//! failure instead of a partially populated aggregation map.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use tokio_util::sync::CancellationToken;

use crate::build::{BuilderCore, ChildValue, Prelude, enter_or_reuse, seal};
use crate::errors::FieldErrors;
use crate::outcome::{BuildFailure, BuildResult};
use crate::visited::VisitedSet;

/// An asynchronous builder in an object graph.
///
/// The contract mirrors [`crate::build::GraphBuilder`]; `construct` returns
/// a boxed future so implementations can await their children.
pub trait AsyncGraphBuilder {
    type Target: 'static;

    fn core(&self) -> &BuilderCore<Self::Target>;

    /// Validate configured fields and produce the instance, awaiting child
    /// builds as needed. Cancellation must be forwarded to every child.
    fn construct<'a>(
        &'a self,
        visited: &'a mut VisitedSet,
        errors: &'a mut FieldErrors,
        cancel: &'a CancellationToken,
    ) -> LocalBoxFuture<'a, Option<Self::Target>>;

    /// Root entry point: build against a fresh visited set.
    fn build<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> LocalBoxFuture<'a, BuildResult<Self::Target>> {
        Box::pin(async move {
            let mut visited = VisitedSet::new();
            self.build_with(&mut visited, cancel).await
        })
    }

    /// Build against the shared visited set of an enclosing invocation.
    fn build_with<'a>(
        &'a self,
        visited: &'a mut VisitedSet,
        cancel: &'a CancellationToken,
    ) -> LocalBoxFuture<'a, BuildResult<Self::Target>> {
        Box::pin(async move {
            let handle = self.core().handle().clone();

            if cancel.is_cancelled() {
                tracing::debug!(builder = %handle.label, "cancelled before entering");
                return BuildResult::Failure(Rc::new(BuildFailure::cancelled(
                    handle,
                    visited.snapshot(),
                )));
            }

            let placeholder = match enter_or_reuse(self.core(), visited) {
                Prelude::Done(result) => return result,
                Prelude::Proceed(placeholder) => placeholder,
            };

            let mut errors = FieldErrors::new();
            let produced = self.construct(visited, &mut errors, cancel).await;

            if cancel.is_cancelled() {
                // Cancellation wins over whatever validation managed to
                // record before stopping.
                tracing::debug!(builder = %handle.label, "cancelled during validation");
                let failure = Rc::new(BuildFailure::cancelled(
                    handle.clone(),
                    visited.snapshot(),
                ));
                let result = BuildResult::Failure(failure);
                visited.finish(&handle, &result);
                return result;
            }

            seal(&handle, placeholder, errors, produced, visited)
        })
    }
}

// ---------------------------------------------------------------------------
// Child helpers
// ---------------------------------------------------------------------------

/// Await every child against the same visited set, one at a time, in
/// declaration order.
pub async fn build_each_async<T: 'static>(
    children: &[Rc<dyn AsyncGraphBuilder<Target = T>>],
    visited: &mut VisitedSet,
    cancel: &CancellationToken,
) -> Vec<BuildResult<T>> {
    let mut results = Vec::with_capacity(children.len());
    for child in children {
        results.push(child.build_with(visited, cancel).await);
    }
    results
}

/// Await a single child for a named field; failures land in `errors` under
/// `key`, exactly like [`crate::build::require_child`].
pub async fn require_child_async<T: 'static>(
    key: &str,
    child: &dyn AsyncGraphBuilder<Target = T>,
    visited: &mut VisitedSet,
    errors: &mut FieldErrors,
    cancel: &CancellationToken,
) -> Option<ChildValue<T>> {
    match child.build_with(visited, cancel).await {
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
