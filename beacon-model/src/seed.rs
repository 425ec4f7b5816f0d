use chrono::{DateTime, Utc};

use crate::ids::ClusterUid;

/// The agreed identity of a cluster.
///
/// At most one seed is ever durably persisted per cluster. A seed is
/// committed once the election key references its uid and the seed has been
/// written to blob storage. `created_at` fixes the phase of the periodic
/// report schedule, so it must never change after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterSeed {
    #[cfg_attr(feature = "serde", serde(rename = "UID"))]
    pub uid: ClusterUid,
    /// Build version of the reporting software. Informational only.
    #[cfg_attr(feature = "serde", serde(rename = "version", default))]
    pub version: String,
    #[cfg_attr(feature = "serde", serde(rename = "created_at"))]
    pub created_at: DateTime<Utc>,
}

impl ClusterSeed {
    pub fn new(
        uid: impl Into<ClusterUid>,
        version: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            version: version.into(),
            created_at,
        }
    }

    /// Build a leader candidate with a freshly generated uid.
    pub fn candidate(version: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(ClusterUid::generate(), version, now)
    }

    /// Whether both seeds name the same cluster.
    pub fn same_cluster(&self, other: &ClusterSeed) -> bool {
        self.uid == other.uid
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::ClusterSeed;

    #[test]
    fn seed_json_uses_stable_field_names() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let seed = ClusterSeed::new("abc", "1.2.3", created);

        let json = serde_json::to_value(&seed).unwrap();
        assert_eq!(json["UID"], "abc");
        assert_eq!(json["version"], "1.2.3");
        assert_eq!(json["created_at"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn missing_version_defaults_to_empty() {
        let seed: ClusterSeed = serde_json::from_str(
            r#"{"UID":"abc","created_at":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(seed.uid.as_str(), "abc");
        assert!(seed.version.is_empty());
    }
}
