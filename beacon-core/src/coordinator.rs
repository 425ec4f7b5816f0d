//! Cluster seed coordinator.
//!
//! Resolves the single [`ClusterSeed`] every process of a cluster agrees on.
//! Leaders race through a compare-and-swap on the election key and the
//! winner publishes the seed blob; followers wait for that blob to appear.
//! Who wins the election and what value is published are decoupled: a leader
//! that dies between winning the CAS and writing the blob is superseded by
//! the next leader to find the blob missing, and that leader writes the seed
//! the election key already names.
//!
//! Both paths retry forever and only return once a seed is agreed or the
//! cancellation token fires.

use std::sync::Arc;

use beacon_model::{ClusterSeed, Role};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::{Backoff, BackoffConfig},
    clock::{Clock, SystemClock},
    error::{BeaconError, Result},
    seed_store::SeedStore,
};

/// Consecutive undecodable reads tolerated before the seed blob is deleted.
pub const DEFAULT_CORRUPTION_THRESHOLD: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub role: Role,
    /// Version string stamped into seeds this process generates.
    pub version: String,
    pub election_backoff: BackoffConfig,
    pub fetch_backoff: BackoffConfig,
    pub corruption_threshold: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            role: Role::Follower,
            version: env!("CARGO_PKG_VERSION").to_string(),
            election_backoff: BackoffConfig::election(),
            fetch_backoff: BackoffConfig::seed_fetch(),
            corruption_threshold: DEFAULT_CORRUPTION_THRESHOLD,
        }
    }
}

/// Counts consecutive corrupt reads of the seed blob.
#[derive(Debug)]
struct CorruptionTracker {
    threshold: u32,
    consecutive: u32,
}

impl CorruptionTracker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record a failed read. Returns true when the blob should be deleted;
    /// the count starts over at that point.
    fn record(&mut self, err: &BeaconError) -> bool {
        match err {
            BeaconError::Corrupt(_) => {
                self.consecutive += 1;
                if self.consecutive >= self.threshold {
                    self.consecutive = 0;
                    return true;
                }
                false
            }
            BeaconError::NotFound(_) => {
                self.consecutive = 0;
                false
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnMissing {
    /// Hand `NotFound` back so the caller can publish.
    Return,
    /// Keep polling until a leader publishes.
    Wait,
}

#[derive(Debug)]
pub struct SeedCoordinator {
    store: SeedStore,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
}

impl SeedCoordinator {
    pub fn new(store: SeedStore, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Block until the cluster seed is agreed.
    ///
    /// Only fails with [`BeaconError::Cancelled`]; every store error is
    /// logged and retried. Both backoffs must be unbounded, which
    /// [`crate::ReporterConfig::validate`] enforces.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<ClusterSeed> {
        let seed = match self.config.role {
            Role::Leader => self.resolve_as_leader(cancel).await?,
            Role::Follower => self.fetch_seed(cancel, OnMissing::Wait).await?,
        };
        info!(
            target: "usage::seed",
            uid = %seed.uid,
            created_at = %seed.created_at,
            role = %self.config.role,
            "cluster seed resolved"
        );
        Ok(seed)
    }

    async fn resolve_as_leader(&self, cancel: &CancellationToken) -> Result<ClusterSeed> {
        let mut candidate =
            ClusterSeed::candidate(self.config.version.clone(), self.clock.now());
        let mut backoff = Backoff::new(self.config.election_backoff, cancel.clone());

        while backoff.ongoing() {
            let election = match self.store.elect_or_adopt(&candidate).await {
                Ok(election) => election,
                Err(err) => {
                    info!(target: "usage::seed", error = %err, "failed to CAS cluster seed key");
                    backoff.wait().await;
                    continue;
                }
            };

            if !election.elected {
                debug!(
                    target: "usage::seed",
                    ours = %candidate.uid,
                    stored = %election.seed.uid,
                    "election key already taken, adopting stored seed"
                );
                candidate = election.seed;
                continue;
            }
            candidate = election.seed;

            match self.fetch_seed(cancel, OnMissing::Return).await {
                Ok(published) => return Ok(published),
                Err(err) if err.is_not_found() => {
                    match self.store.write_persisted_seed(&candidate).await {
                        Ok(()) => {
                            info!(target: "usage::seed", uid = %candidate.uid, "published new cluster seed");
                            return Ok(candidate);
                        }
                        Err(err) => {
                            info!(target: "usage::seed", error = %err, "failed to write cluster seed");
                        }
                    }
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    info!(target: "usage::seed", error = %err, "failed to fetch cluster seed");
                }
            }
            backoff.wait().await;
        }

        Err(backoff.err())
    }

    async fn fetch_seed(
        &self,
        cancel: &CancellationToken,
        on_missing: OnMissing,
    ) -> Result<ClusterSeed> {
        let mut backoff = Backoff::new(self.config.fetch_backoff, cancel.clone());
        let mut corruption = CorruptionTracker::new(self.config.corruption_threshold);

        while backoff.ongoing() {
            let err = match self.store.read_persisted_seed().await {
                Ok(seed) => return Ok(seed),
                Err(err) => err,
            };

            if corruption.record(&err) {
                warn!(
                    target: "usage::seed",
                    path = self.store.seed_path(),
                    threshold = self.config.corruption_threshold,
                    "cluster seed unreadable too many times in a row, deleting it"
                );
                if let Err(delete_err) = self.store.delete_persisted_seed().await {
                    error!(target: "usage::seed", error = %delete_err, "failed to delete corrupted cluster seed");
                }
            }

            if err.is_not_found() {
                debug!(target: "usage::seed", "cluster seed not published yet");
                if on_missing == OnMissing::Return {
                    return Err(err);
                }
            } else {
                debug!(target: "usage::seed", error = %err, "failed to read cluster seed");
            }
            backoff.wait().await;
        }

        Err(backoff.err())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn corruption_tracker_fires_on_threshold_and_restarts() {
        let mut tracker = CorruptionTracker::new(4);
        let corrupt = BeaconError::Corrupt("bad".into());

        let fired: Vec<bool> = (0..8).map(|_| tracker.record(&corrupt)).collect();
        assert_eq!(fired, [false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn not_found_breaks_a_corruption_streak() {
        let mut tracker = CorruptionTracker::new(2);
        let corrupt = BeaconError::Corrupt("bad".into());

        assert!(!tracker.record(&corrupt));
        assert!(!tracker.record(&BeaconError::NotFound("gone".into())));
        assert!(!tracker.record(&corrupt));
        assert!(tracker.record(&corrupt));
    }

    #[test]
    fn io_errors_neither_count_nor_reset() {
        let mut tracker = CorruptionTracker::new(2);
        let corrupt = BeaconError::Corrupt("bad".into());

        assert!(!tracker.record(&corrupt));
        assert!(!tracker.record(&BeaconError::Io("disk".into())));
        assert!(tracker.record(&corrupt));
    }

    #[test]
    fn default_config_matches_slow_unbounded_retry() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.corruption_threshold, 4);
        assert!(config.election_backoff.is_unbounded());
        assert_eq!(config.fetch_backoff.max_backoff, Duration::from_secs(60));
    }
}
