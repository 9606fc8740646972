//! The Success/Failure result model for one build attempt.
//!
//! A `BuildResult` is immutable once constructed. Success carries the
//! builder's placeholder cell (fully resolved for completed builds, still
//! pending when handed to a caller inside an unresolved cycle); Failure
//! carries the originating builder, every recorded cause, and a snapshot of
//! the visited set for whole-graph diagnostics. Reading the wrong variant is
//! a programming error and panics rather than returning a default.

use std::rc::Rc;

use graphsmith_types::cause::BuildCause;
use graphsmith_types::identity::BuilderHandle;
use graphsmith_types::snapshot::VisitedSnapshot;
use serde_json::json;

use crate::deferred::BuildRef;
use crate::errors::FieldErrors;

// ---------------------------------------------------------------------------
// BuildFailure
// ---------------------------------------------------------------------------

/// Everything known about a failed build attempt.
#[derive(Debug)]
pub struct BuildFailure {
    origin: BuilderHandle,
    keyed: FieldErrors,
    causes: Vec<BuildCause>,
    visited: VisitedSnapshot,
}

impl BuildFailure {
    /// Turn a non-empty aggregation map into a failure.
    ///
    /// The flattened cause list gets a trailing `BuildFailed` summary, so a
    /// parent absorbing this failure under a field key records the specific
    /// causes plus "failed to build" under that key.
    pub fn from_errors(
        origin: BuilderHandle,
        keyed: FieldErrors,
        visited: VisitedSnapshot,
    ) -> Self {
        let mut causes = keyed.flatten();
        causes.push(BuildCause::BuildFailed {
            label: origin.label.clone(),
        });
        Self {
            origin,
            keyed,
            causes,
            visited,
        }
    }

    /// A failure for a build that observed cancellation.
    ///
    /// Carries the single `Cancelled` cause instead of a partially populated
    /// aggregation map.
    pub fn cancelled(origin: BuilderHandle, visited: VisitedSnapshot) -> Self {
        Self {
            origin,
            keyed: FieldErrors::new(),
            causes: vec![BuildCause::Cancelled],
            visited,
        }
    }

    /// The builder this failure originated from.
    pub fn origin(&self) -> &BuilderHandle {
        &self.origin
    }

    /// Every cause, flattened in key order with the trailing summary.
    pub fn causes(&self) -> &[BuildCause] {
        &self.causes
    }

    /// The causes still keyed by field, as recorded.
    pub fn keyed(&self) -> &FieldErrors {
        &self.keyed
    }

    /// The visited set as it stood when this failure was made.
    pub fn visited(&self) -> &VisitedSnapshot {
        &self.visited
    }

    pub fn is_cancelled(&self) -> bool {
        self.causes.iter().any(BuildCause::is_cancellation)
    }

    /// Render the failure as a JSON report for logs and tooling.
    pub fn diagnostics(&self) -> serde_json::Value {
        json!({
            "builder": {
                "id": self.origin.id.to_string(),
                "label": self.origin.label,
            },
            "causes": self.causes.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            "fields": self.keyed.to_json(),
            "visited": serde_json::to_value(&self.visited).unwrap_or_else(|_| json!(null)),
        })
    }
}

// ---------------------------------------------------------------------------
// BuildResult
// ---------------------------------------------------------------------------

/// Outcome of one build attempt.
///
/// Cloning shares the underlying cell / failure record, so a memoized result
/// re-read from the visited set is identical to the original.
#[derive(Debug)]
pub enum BuildResult<T> {
    Success(Rc<BuildRef<T>>),
    Failure(Rc<BuildFailure>),
}

impl<T> Clone for BuildResult<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Success(cell) => Self::Success(Rc::clone(cell)),
            Self::Failure(failure) => Self::Failure(Rc::clone(failure)),
        }
    }
}

impl<T> BuildResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The placeholder cell of a successful build.
    ///
    /// Panics on a failure: causes are the only thing a failed build has.
    pub fn handle(&self) -> Rc<BuildRef<T>> {
        match self {
            Self::Success(cell) => Rc::clone(cell),
            Self::Failure(failure) => panic!(
                "attempted to read the instance of a failed build for '{}'",
                failure.origin().label
            ),
        }
    }

    /// The produced instance.
    ///
    /// Panics on a failure, and panics if the cell is still pending (the
    /// caller sits inside an unresolved cycle and must use [`Self::handle`]
    /// plus a patch action instead).
    pub fn instance(&self) -> Rc<T> {
        let cell = self.handle();
        cell.get()
            .unwrap_or_else(|| panic!("instance read from a still-pending placeholder"))
    }

    /// The instance if this is a success and the cell has resolved.
    pub fn try_instance(&self) -> Option<Rc<T>> {
        match self {
            Self::Success(cell) => cell.get(),
            Self::Failure(_) => None,
        }
    }

    /// The failure record.
    ///
    /// Panics on a success: a successful build has no causes to read.
    pub fn failure(&self) -> &BuildFailure {
        match self {
            Self::Success(_) => {
                panic!("attempted to read the causes of a successful build")
            }
            Self::Failure(failure) => failure,
        }
    }

    /// Shorthand for `failure().causes()`.
    pub fn causes(&self) -> &[BuildCause] {
        self.failure().causes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_failure() -> BuildFailure {
        let mut errors = FieldErrors::new();
        errors.record("name", BuildCause::missing("name"));
        errors.record("age", BuildCause::invalid("age", "invalid age"));
        BuildFailure::from_errors(
            BuilderHandle::new("person"),
            errors,
            VisitedSnapshot::default(),
        )
    }

    #[test]
    fn test_summary_cause_is_appended_last() {
        let failure = sample_failure();
        let causes = failure.causes();
        assert_eq!(causes.len(), 3);
        assert_eq!(
            causes[2],
            BuildCause::BuildFailed {
                label: "person".to_string()
            }
        );
    }

    #[test]
    fn test_keyed_view_survives_flattening() {
        let failure = sample_failure();
        assert_eq!(failure.keyed().causes_for("age").len(), 1);
        assert_eq!(
            failure.keyed().keys().collect::<Vec<_>>(),
            vec!["name", "age"]
        );
    }

    #[test]
    fn test_success_accessors() {
        let result = BuildResult::Success(BuildRef::resolved(Rc::new(41)));
        assert!(result.is_success());
        assert_eq!(*result.instance(), 41);
        assert_eq!(result.try_instance().as_deref(), Some(&41));
    }

    #[test]
    fn test_clone_shares_the_cell() {
        let result = BuildResult::Success(BuildRef::resolved(Rc::new(1)));
        let copy = result.clone();
        assert!(Rc::ptr_eq(&result.handle(), &copy.handle()));
    }

    #[test]
    fn test_cancelled_failure() {
        let failure =
            BuildFailure::cancelled(BuilderHandle::new("person"), VisitedSnapshot::default());
        assert!(failure.is_cancelled());
        assert_eq!(failure.causes(), &[BuildCause::Cancelled]);
    }

    #[test]
    fn test_diagnostics_report() {
        let failure = sample_failure();
        let report = failure.diagnostics();
        assert_eq!(report["builder"]["label"], "person");
        assert_eq!(report["causes"][2], "failed to build person");
        assert_eq!(
            report["fields"]["age"][0],
            "invalid value for 'age': invalid age"
        );
    }

    #[test]
    #[should_panic(expected = "failed build")]
    fn test_instance_of_failure_panics() {
        let result: BuildResult<i32> = BuildResult::Failure(Rc::new(sample_failure()));
        let _ = result.instance();
    }

    #[test]
    #[should_panic(expected = "successful build")]
    fn test_causes_of_success_panics() {
        let result = BuildResult::Success(BuildRef::resolved(Rc::new(1)));
        let _ = result.causes();
    }

    #[test]
    #[should_panic(expected = "still-pending")]
    fn test_instance_of_pending_cell_panics() {
        let result: BuildResult<i32> = BuildResult::Success(BuildRef::new());
        let _ = result.instance();
    }
}
