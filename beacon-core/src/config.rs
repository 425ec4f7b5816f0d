use std::time::Duration;

use beacon_model::Role;
use serde::{Deserialize, Serialize};

use crate::{
    backoff::BackoffConfig,
    coordinator::{CoordinatorConfig, DEFAULT_CORRUPTION_THRESHOLD},
    error::{BeaconError, Result},
    seed_store::{DEFAULT_ELECTION_KEY, DEFAULT_SEED_PATH},
};

/// Knobs for the usage reporter.
///
/// Every field carries a default so deployments only spell out what they
/// change. Durations use humantime notation (`"1h"`, `"30s"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Turns the reporter off entirely: no seed resolution, no reports.
    pub disabled: bool,
    /// `leader` processes may publish the cluster seed; `follower`
    /// processes only read it.
    pub role: Role,
    /// Spacing of report slots.
    #[serde(with = "crate::duration_serde")]
    pub report_interval: Duration,
    /// How often the reporter checks whether a slot is due. Bounds the lag
    /// between a slot and its delivery, and must stay below
    /// `report_interval` or slots could be skipped.
    #[serde(with = "crate::duration_serde")]
    pub check_interval: Duration,
    pub election_backoff: BackoffConfig,
    pub fetch_backoff: BackoffConfig,
    pub send_backoff: BackoffConfig,
    /// Consecutive undecodable reads before the seed blob is deleted.
    pub corruption_threshold: u32,
    pub election_key: String,
    pub seed_path: String,
    /// Version stamped into newly generated seeds.
    pub version: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            role: Role::Follower,
            report_interval: Duration::from_secs(60 * 60),
            check_interval: Duration::from_secs(60),
            election_backoff: BackoffConfig::election(),
            fetch_backoff: BackoffConfig::seed_fetch(),
            send_backoff: BackoffConfig::report_send(),
            corruption_threshold: DEFAULT_CORRUPTION_THRESHOLD,
            election_key: DEFAULT_ELECTION_KEY.to_string(),
            seed_path: DEFAULT_SEED_PATH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.report_interval.is_zero() {
            return Err(BeaconError::InvalidConfig(
                "report_interval must be greater than zero".into(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(BeaconError::InvalidConfig(
                "check_interval must be greater than zero".into(),
            ));
        }
        if self.check_interval >= self.report_interval {
            return Err(BeaconError::InvalidConfig(format!(
                "check_interval ({}) must be shorter than report_interval ({})",
                humantime::format_duration(self.check_interval),
                humantime::format_duration(self.report_interval),
            )));
        }
        if self.corruption_threshold == 0 {
            return Err(BeaconError::InvalidConfig(
                "corruption_threshold must be at least 1".into(),
            ));
        }
        if self.election_key.trim().is_empty() || self.seed_path.trim().is_empty() {
            return Err(BeaconError::InvalidConfig(
                "election_key and seed_path must not be empty".into(),
            ));
        }
        self.election_backoff.validate("election_backoff")?;
        self.fetch_backoff.validate("fetch_backoff")?;
        self.send_backoff.validate("send_backoff")?;
        // Seed resolution only ends on success or cancellation.
        for (name, backoff) in [
            ("election_backoff", &self.election_backoff),
            ("fetch_backoff", &self.fetch_backoff),
        ] {
            if !backoff.is_unbounded() {
                return Err(BeaconError::InvalidConfig(format!(
                    "{name}: max_retries must be 0 (retry until cancelled), got {}",
                    backoff.max_retries
                )));
            }
        }
        if self.send_backoff.is_unbounded() {
            return Err(BeaconError::InvalidConfig(
                "send_backoff: max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            role: self.role,
            version: self.version.clone(),
            election_backoff: self.election_backoff,
            fetch_backoff: self.fetch_backoff,
            corruption_threshold: self.corruption_threshold,
        }
    }
}
