use std::{path::PathBuf, time::Duration};

use beacon_core::ReporterConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Everything the agent needs to run a reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Reporter behaviour: role, cadence and retry policies.
    pub usage_report: ReporterConfig,
    /// Where the election key lives.
    pub coordination: CoordinationBackend,
    /// Where the published seed blob lives.
    pub blob: BlobBackend,
    pub transmitter: TransmitterConfig,
}

/// Coordination store backing the leader election.
///
/// `memory` only coordinates within one process and exists for local runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinationBackend {
    #[default]
    Memory,
    Redis {
        url: String,
    },
}

/// Blob store holding the published cluster seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobBackend {
    #[default]
    Memory,
    /// A `cacache` directory. Every process of the cluster must see the same
    /// directory for the seed to be shared.
    Cacache {
        root: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// Report collector URL. Required unless reporting is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,
    #[serde(with = "beacon_core::duration_serde")]
    pub timeout: Duration,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    pub fn is_disabled(&self) -> bool {
        self.usage_report.disabled
    }
}
