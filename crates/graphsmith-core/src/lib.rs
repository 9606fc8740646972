//! Object-graph construction engine.
//!
//! A family of "builder" values describes, declaratively, how to produce a
//! typed object; builders may reference each other -- including cyclically --
//! before any concrete object exists. This crate is the engine under those
//! builders:
//! - `errors` -- append-accumulating failure aggregation per field key
//! - `deferred` -- two-phase placeholder cells with deferred patch actions
//! - `visited` -- per-invocation cycle-detection and memoization ledger
//! - `outcome` -- the immutable Success/Failure result model
//! - `build` -- the recursive synchronous build algorithm and child helpers
//! - `build_async` -- the same algorithm with suspension and cancellation
//! - `pipeline` -- ordered build steps over shared intermediate state
//!
//! One build invocation owns one visited set and one aggregation map; the
//! engine holds no global state.

pub mod build;
pub mod build_async;
pub mod deferred;
pub mod errors;
pub mod outcome;
pub mod pipeline;
pub mod visited;

pub use build::{BuilderCore, ChildValue, GraphBuilder, absorb_failures, build_each, require_child};
pub use build_async::{AsyncGraphBuilder, build_each_async, require_child_async};
pub use deferred::BuildRef;
pub use errors::FieldErrors;
pub use outcome::{BuildFailure, BuildResult};
pub use pipeline::{PipelinePhase, StepFlow, StepPipeline, StepState};
pub use visited::VisitedSet;
