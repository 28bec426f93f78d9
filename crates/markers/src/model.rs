use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque marker identifier.
///
/// Fresh ids are random UUIDs; ids read back from a snapshot are kept
/// verbatim whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A user-placed point annotation on the globe.
///
/// Field names match the persisted snapshot: `{id, lng, lat, label, note}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub lng: f64,
    pub lat: f64,
    pub label: String,
    pub note: String,
}

/// Collection change notifications, in mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerChange {
    Loaded { count: usize },
    Added(MarkerId),
    NoteUpdated(MarkerId),
    Renamed(MarkerId),
    Deleted(MarkerId),
    Cleared { count: usize },
}
