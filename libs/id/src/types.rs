//! Typed ID definitions for control-plane resources.
//!
//! Each ID type has a unique prefix that identifies the resource type.
//! IDs are ULID-based for sortability and uniqueness.

use crate::define_id;

define_id!(ReleaseJobId, "rel");

/// Event ID is a simple monotonic integer, not ULID-based.
///
/// History stores assign these in insertion order, so per-service event
/// streams sort by id as well as by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(i64);

impl EventId {
    /// Creates a new EventId from an i64.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EventId> for i64 {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl serde::Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i64::deserialize(deserializer)?;
        Ok(Self(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_job_id_roundtrip() {
        let id = ReleaseJobId::new();
        let s = id.to_string();
        let parsed: ReleaseJobId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_release_job_id_prefix() {
        let id = ReleaseJobId::new();
        assert!(id.to_string().starts_with("rel_"));
    }

    #[test]
    fn test_release_job_id_invalid_prefix() {
        let result: Result<ReleaseJobId, _> = "job_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidPrefix { .. }
        ));
    }

    #[test]
    fn test_release_job_id_missing_separator() {
        let result: Result<ReleaseJobId, _> = "rel01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_release_job_id_empty() {
        let result: Result<ReleaseJobId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_release_job_id_sortable() {
        let id1 = ReleaseJobId::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let id2 = ReleaseJobId::new();
        // ULIDs are time-ordered, so id1 < id2
        assert!(id1 < id2);
    }

    #[test]
    fn test_release_job_id_json_roundtrip() {
        let id = ReleaseJobId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ReleaseJobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_event_id_roundtrip() {
        let id = EventId::new(12345);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
