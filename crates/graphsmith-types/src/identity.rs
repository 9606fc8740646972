use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity handle for one builder value.
///
/// Identity is minted once per builder and follows the builder around by
/// value: two builders that happen to describe the same target still carry
/// distinct ids, so the engine never merges them by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuilderId(pub Uuid);

impl BuilderId {
    /// Create a new BuilderId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a BuilderId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for BuilderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuilderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BuilderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lightweight record of a builder: its identity plus a human-readable label.
///
/// Carried by failures ("originating builder") and by visited-set snapshots
/// so diagnostics can name every participant without holding the builders
/// themselves alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderHandle {
    pub id: BuilderId,
    pub label: String,
}

impl BuilderHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: BuilderId::new(),
            label: label.into(),
        }
    }
}

impl fmt::Display for BuilderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_ids_are_distinct() {
        assert_ne!(BuilderId::new(), BuilderId::new());
    }

    #[test]
    fn test_builder_id_roundtrip() {
        let id = BuilderId::new();
        let parsed: BuilderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_handle_display_includes_label() {
        let handle = BuilderHandle::new("person");
        assert!(handle.to_string().starts_with("person ("));
    }

    #[test]
    fn test_handle_serde() {
        let handle = BuilderHandle::new("person");
        let json = serde_json::to_string(&handle).unwrap();
        let parsed: BuilderHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, handle);
    }
}
