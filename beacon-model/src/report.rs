use chrono::{DateTime, Utc};

use crate::seed::ClusterSeed;

/// Body of one usage report.
///
/// Carries only the anonymous cluster identity, the schedule slot being
/// reported and coarse build/platform facts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UsageReport {
    #[cfg_attr(feature = "serde", serde(rename = "clusterID"))]
    pub cluster_id: String,
    pub created_at: DateTime<Utc>,
    /// Schedule slot (`created_at + k * period`) this report covers.
    pub interval: DateTime<Utc>,
    /// Report period in whole seconds.
    pub interval_period: u64,
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl UsageReport {
    pub fn new(
        seed: &ClusterSeed,
        interval: DateTime<Utc>,
        period: std::time::Duration,
    ) -> Self {
        Self {
            cluster_id: seed.uid.to_string(),
            created_at: seed.created_at,
            interval,
            interval_period: period.as_secs(),
            version: seed.version.clone(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}
