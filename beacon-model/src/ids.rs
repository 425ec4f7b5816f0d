use std::fmt;

use uuid::Uuid;

/// Globally unique identifier of a cluster seed.
///
/// Generated locally by a leader candidate and immutable once committed.
/// Stored as a string so seeds written by other tooling still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ClusterUid(pub String);

impl ClusterUid {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        ClusterUid(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClusterUid {
    fn from(value: &str) -> Self {
        ClusterUid(value.to_string())
    }
}

impl From<String> for ClusterUid {
    fn from(value: String) -> Self {
        ClusterUid(value)
    }
}

impl AsRef<str> for ClusterUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
