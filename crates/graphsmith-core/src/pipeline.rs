//! Ordered build steps over shared intermediate state.
//!
//! A `StepPipeline` runs its steps in order against one run-scoped
//! [`StepState`] and one shared [`FieldErrors`]. After each step the error
//! map is checked first -- a non-empty map terminates the run immediately --
//! then the step's flow: `Finalize` carries the finished instance out.
//! Running out of steps without a terminal is a programming error: every
//! success path must end in exactly one finalizing step.
//!
//! Steps are sync or suspension-capable; suspension-capable steps may be
//! bounded by an optional per-step timeout, and a cancellation token is
//! checked between steps.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use graphsmith_types::cause::BuildCause;
use graphsmith_types::identity::BuilderHandle;
use graphsmith_types::snapshot::VisitedSnapshot;
use tokio_util::sync::CancellationToken;

use crate::deferred::BuildRef;
use crate::errors::FieldErrors;
use crate::outcome::{BuildFailure, BuildResult};

// ---------------------------------------------------------------------------
// StepState
// ---------------------------------------------------------------------------

/// Mutable intermediate state shared by every step of one pipeline run.
///
/// Arbitrary keys map to arbitrary values; the map is created at the start
/// of a run and destroyed with it.
#[derive(Default)]
pub struct StepState {
    values: HashMap<String, Box<dyn Any>>,
}

impl StepState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: 'static>(&mut self, key: impl Into<String>, value: V) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn get<V: 'static>(&self, key: &str) -> Option<&V> {
        self.values.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    pub fn get_mut<V: 'static>(&mut self, key: &str) -> Option<&mut V> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<V>())
    }

    /// Remove and return a value, handing ownership to the caller.
    pub fn take<V: 'static>(&mut self, key: &str) -> Option<V> {
        let value = self.values.remove(key)?;
        match value.downcast::<V>() {
            Ok(boxed) => Some(*boxed),
            Err(original) => {
                // Wrong type requested: put the value back untouched.
                self.values.insert(key.to_string(), original);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// What a step decided.
pub enum StepFlow<T> {
    /// Keep going; later steps read whatever this one left in the state.
    Continue,
    /// The pipeline is done; this is the produced instance.
    Finalize(T),
}

type SyncStepFn<T> = Box<dyn Fn(&mut StepState, &mut FieldErrors) -> StepFlow<T>>;
type SuspendStepFn<T> =
    Box<dyn for<'a> Fn(&'a mut StepState, &'a mut FieldErrors) -> LocalBoxFuture<'a, StepFlow<T>>>;

enum Step<T> {
    Sync { name: String, run: SyncStepFn<T> },
    Suspend { name: String, run: SuspendStepFn<T> },
}

impl<T> Step<T> {
    fn name(&self) -> &str {
        match self {
            Step::Sync { name, .. } | Step::Suspend { name, .. } => name,
        }
    }
}

/// Phase of the most recent run, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Pending,
    Running,
    Finalized,
    Failed,
}

// ---------------------------------------------------------------------------
// StepPipeline
// ---------------------------------------------------------------------------

/// An ordered sequence of independent build steps sharing one mutable
/// intermediate-state container.
///
/// Steps are `Fn`, so a pipeline may be run repeatedly; each run gets a
/// fresh state map and error map.
pub struct StepPipeline<T> {
    handle: BuilderHandle,
    steps: Vec<Step<T>>,
    step_timeout: Option<Duration>,
    phase: Cell<PipelinePhase>,
}

impl<T: 'static> StepPipeline<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            handle: BuilderHandle::new(label),
            steps: Vec::new(),
            step_timeout: None,
            phase: Cell::new(PipelinePhase::Pending),
        }
    }

    pub fn handle(&self) -> &BuilderHandle {
        &self.handle
    }

    pub fn last_phase(&self) -> PipelinePhase {
        self.phase.get()
    }

    /// Append a synchronous step.
    pub fn step(
        mut self,
        name: impl Into<String>,
        run: impl Fn(&mut StepState, &mut FieldErrors) -> StepFlow<T> + 'static,
    ) -> Self {
        self.steps.push(Step::Sync {
            name: name.into(),
            run: Box::new(run),
        });
        self
    }

    /// Append a suspension-capable step.
    pub fn suspend_step(
        mut self,
        name: impl Into<String>,
        run: impl for<'a> Fn(&'a mut StepState, &'a mut FieldErrors) -> LocalBoxFuture<'a, StepFlow<T>>
        + 'static,
    ) -> Self {
        self.steps.push(Step::Suspend {
            name: name.into(),
            run: Box::new(run),
        });
        self
    }

    /// Bound every suspension-capable step by a time budget. A step that
    /// exceeds it records a `Timeout` cause under its own name, which
    /// terminates the run like any other failure.
    pub fn step_timeout(mut self, budget: Duration) -> Self {
        self.step_timeout = Some(budget);
        self
    }

    /// Run the steps in order until one finalizes or fails.
    pub async fn run(&self, cancel: &CancellationToken) -> BuildResult<T> {
        self.phase.set(PipelinePhase::Running);
        let mut state = StepState::new();
        let mut errors = FieldErrors::new();

        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(pipeline = %self.handle.label, index, "cancelled between steps");
                self.phase.set(PipelinePhase::Failed);
                return BuildResult::Failure(Rc::new(BuildFailure::cancelled(
                    self.handle.clone(),
                    VisitedSnapshot::default(),
                )));
            }

            tracing::debug!(pipeline = %self.handle.label, step = step.name(), index, "running step");
            let flow = match step {
                Step::Sync { run, .. } => run(&mut state, &mut errors),
                Step::Suspend { name, run } => match self.step_timeout {
                    Some(budget) => {
                        match tokio::time::timeout(budget, run(&mut state, &mut errors)).await {
                            Ok(flow) => flow,
                            Err(_) => {
                                tracing::warn!(
                                    pipeline = %self.handle.label,
                                    step = name.as_str(),
                                    ?budget,
                                    "step exceeded its time budget"
                                );
                                errors.record(
                                    name.clone(),
                                    BuildCause::Timeout { step: name.clone() },
                                );
                                StepFlow::Continue
                            }
                        }
                    }
                    None => run(&mut state, &mut errors).await,
                },
            };

            // The error map outranks the step's own flow decision.
            if !errors.is_empty() {
                self.phase.set(PipelinePhase::Failed);
                return BuildResult::Failure(Rc::new(BuildFailure::from_errors(
                    self.handle.clone(),
                    errors,
                    VisitedSnapshot::default(),
                )));
            }

            if let StepFlow::Finalize(value) = flow {
                self.phase.set(PipelinePhase::Finalized);
                return BuildResult::Success(BuildRef::resolved(Rc::new(value)));
            }
        }

        panic!(
            "pipeline '{}' ran out of steps without producing an instance",
            self.handle.label
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use graphsmith_types::cause::BuildCause;

    use super::*;

    // -----------------------------------------------------------------------
    // State sharing and termination
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_steps_share_state_until_finalize() {
        let pipeline: StepPipeline<String> = StepPipeline::new("greeting")
            .step("collect", |state, _errors| {
                state.insert("word", "hello".to_string());
                StepFlow::Continue
            })
            .step("assemble", |state, _errors| {
                let word: &String = state.get("word").expect("prior step ran");
                StepFlow::Finalize(format!("{word}, world"))
            });

        let result = pipeline.run(&CancellationToken::new()).await;
        assert_eq!(*result.instance(), "hello, world");
        assert_eq!(pipeline.last_phase(), PipelinePhase::Finalized);
    }

    #[tokio::test]
    async fn test_failure_short_circuits_later_steps() {
        let third_ran = Rc::new(Cell::new(false));
        let observed = Rc::clone(&third_ran);

        let pipeline: StepPipeline<String> = StepPipeline::new("doomed")
            .step("first", |state, _errors| {
                state.insert("count", 1_u32);
                StepFlow::Continue
            })
            .step("second", |_state, errors| {
                errors.record("input", BuildCause::invalid("input", "rejected"));
                StepFlow::Continue
            })
            .step("third", move |_state, _errors| {
                observed.set(true);
                StepFlow::Finalize("unreachable".to_string())
            });

        let result = pipeline.run(&CancellationToken::new()).await;
        assert!(result.is_failure());
        assert!(!third_ran.get(), "step after a failure must not run");
        assert_eq!(pipeline.last_phase(), PipelinePhase::Failed);
        assert_eq!(result.failure().origin().label, "doomed");
    }

    #[tokio::test]
    async fn test_failure_outranks_finalize_from_same_step() {
        let pipeline: StepPipeline<String> = StepPipeline::new("conflicted").step(
            "only",
            |_state, errors| {
                errors.record("input", BuildCause::invalid("input", "rejected"));
                StepFlow::Finalize("should not count".to_string())
            },
        );

        let result = pipeline.run(&CancellationToken::new()).await;
        assert!(result.is_failure());
    }

    #[tokio::test]
    #[should_panic(expected = "ran out of steps")]
    async fn test_no_terminal_step_panics() {
        let pipeline: StepPipeline<String> =
            StepPipeline::new("endless").step("noop", |_state, _errors| StepFlow::Continue);
        let _ = pipeline.run(&CancellationToken::new()).await;
    }

    // -----------------------------------------------------------------------
    // Suspension, timeout, cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_suspend_step_awaits_and_finalizes() {
        let pipeline: StepPipeline<u32> = StepPipeline::new("slow")
            .step("seed", |state, _errors| {
                state.insert("n", 20_u32);
                StepFlow::Continue
            })
            .suspend_step("double", |state, _errors| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let n = *state.get::<u32>("n").expect("seeded");
                    StepFlow::Finalize(n * 2)
                })
            });

        let result = pipeline.run(&CancellationToken::new()).await;
        assert_eq!(*result.instance(), 40);
    }

    #[tokio::test]
    async fn test_step_timeout_records_timeout_cause() {
        let pipeline: StepPipeline<u32> = StepPipeline::new("stuck")
            .step_timeout(Duration::from_millis(5))
            .suspend_step("hang", |_state, _errors| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    StepFlow::Finalize(0)
                })
            });

        let result = pipeline.run(&CancellationToken::new()).await;
        let causes = result.failure().keyed().causes_for("hang");
        assert_eq!(
            causes,
            &[BuildCause::Timeout {
                step: "hang".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let cancel = CancellationToken::new();
        let trip = cancel.clone();

        let pipeline: StepPipeline<u32> = StepPipeline::new("cancelled")
            .step("first", move |_state, _errors| {
                trip.cancel();
                StepFlow::Continue
            })
            .step("second", |_state, _errors| StepFlow::Finalize(1));

        let result = pipeline.run(&cancel).await;
        assert!(result.failure().is_cancelled());
        assert_eq!(pipeline.last_phase(), PipelinePhase::Failed);
    }

    // -----------------------------------------------------------------------
    // StepState
    // -----------------------------------------------------------------------

    #[test]
    fn test_state_typed_accessors() {
        let mut state = StepState::new();
        state.insert("count", 3_u32);
        state.insert("label", "draft".to_string());

        assert_eq!(state.get::<u32>("count"), Some(&3));
        assert_eq!(state.get::<String>("count"), None, "wrong type reads as absent");

        *state.get_mut::<u32>("count").unwrap() += 1;
        assert_eq!(state.take::<u32>("count"), Some(4));
        assert!(!state.contains("count"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_state_take_with_wrong_type_keeps_value() {
        let mut state = StepState::new();
        state.insert("count", 3_u32);

        assert_eq!(state.take::<String>("count"), None);
        assert_eq!(state.get::<u32>("count"), Some(&3));
    }
}
