//! Shared domain types for Graphsmith.
//!
//! This crate contains the types that flow across the construction engine's
//! boundary: builder identity handles, the build-cause taxonomy, and the
//! visited-set snapshot embedded in failures for diagnostics.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod cause;
pub mod identity;
pub mod snapshot;
