use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single problem recorded against a builder during one build attempt.
///
/// Causes are data, not control flow: validation records as many of them as
/// it finds and keeps going, so one build attempt reports every problem in
/// the graph rather than the first.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildCause {
    /// A required value was never configured.
    #[error("required value for '{field}' is missing")]
    Missing { field: String },

    /// A value was configured but rejected.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Summary cause appended when a builder's aggregation map is non-empty.
    #[error("failed to build {label}")]
    BuildFailed { label: String },

    /// The asynchronous build observed cancellation before completing.
    #[error("build cancelled")]
    Cancelled,

    /// A suspension-capable pipeline step exceeded its time budget.
    #[error("step '{step}' timed out")]
    Timeout { step: String },

    /// Free-form domain cause.
    #[error("{text}")]
    Message { text: String },
}

impl BuildCause {
    /// Convenience constructor for `Invalid`.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for `Missing`.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    /// Convenience constructor for `Message`.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Whether this cause marks an observed cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
