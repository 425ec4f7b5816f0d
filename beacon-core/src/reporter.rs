//! Usage reporter service.
//!
//! Resolves the cluster seed once, then checks on a fixed period whether the
//! next report slot is due and delivers it with a bounded retry envelope.
//! A slot that could not be delivered stays scheduled and is retried on the
//! following check; slots are never skipped and never advanced twice.

use std::{fmt, sync::Arc};

use beacon_model::ClusterSeed;
use chrono::{DateTime, Utc};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backoff::Backoff,
    clock::{Clock, SystemClock},
    config::ReporterConfig,
    coordinator::SeedCoordinator,
    error::{BeaconError, MultiError, Result},
    scheduler::ReportSchedule,
    seed_store::SeedStore,
    store::{BlobStore, CoordinationStore},
    transmitter::Transmitter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Uninitialized,
    /// Waiting for the cluster seed to be agreed.
    Resolving,
    Scheduling,
    /// Between checks.
    Idle,
    /// A slot is due and being delivered.
    Reporting,
    Stopped,
}

impl fmt::Display for ReporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReporterState::Uninitialized => "uninitialized",
            ReporterState::Resolving => "resolving",
            ReporterState::Scheduling => "scheduling",
            ReporterState::Idle => "idle",
            ReporterState::Reporting => "reporting",
            ReporterState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of one due check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotDue,
    Sent { interval: DateTime<Utc> },
    /// Every attempt failed; `interval` remains the next slot.
    Failed {
        interval: DateTime<Utc>,
        attempts: u32,
    },
}

pub struct Reporter {
    config: ReporterConfig,
    coordinator: SeedCoordinator,
    transmitter: Arc<dyn Transmitter>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ReporterState>,
    cluster: Option<ClusterSeed>,
    schedule: Option<ReportSchedule>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("role", &self.config.role)
            .field("state", &*self.state.borrow())
            .field("cluster", &self.cluster)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl Reporter {
    /// Build a reporter, or `None` when reporting is disabled.
    ///
    /// A disabled reporter touches neither store.
    pub fn new(
        config: ReporterConfig,
        coordination: Arc<dyn CoordinationStore>,
        blobs: Arc<dyn BlobStore>,
        transmitter: Arc<dyn Transmitter>,
    ) -> Result<Option<Self>> {
        if config.disabled {
            info!(target: "usage::reporter", "usage reporting disabled");
            return Ok(None);
        }
        config.validate()?;

        let store = SeedStore::new(coordination, blobs)
            .with_election_key(config.election_key.clone())
            .with_seed_path(config.seed_path.clone());
        let coordinator = SeedCoordinator::new(store, config.coordinator());
        let (state, _) = watch::channel(ReporterState::Uninitialized);

        Ok(Some(Self {
            config,
            coordinator,
            transmitter,
            clock: Arc::new(SystemClock),
            state,
            cluster: None,
            schedule: None,
        }))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.coordinator = self.coordinator.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<ReporterState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ReporterState {
        *self.state.borrow()
    }

    /// The agreed cluster seed, once [`Reporter::init`] has returned.
    pub fn cluster(&self) -> Option<&ClusterSeed> {
        self.cluster.as_ref()
    }

    pub fn schedule(&self) -> Option<&ReportSchedule> {
        self.schedule.as_ref()
    }

    fn set_state(&self, next: ReporterState) {
        self.state.send_replace(next);
    }

    /// Resolve the cluster seed and compute the first report slot.
    ///
    /// Blocks until the seed is agreed; only cancellation makes it fail.
    pub async fn init(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.set_state(ReporterState::Resolving);
        let seed = match self.coordinator.resolve(cancel).await {
            Ok(seed) => seed,
            Err(err) => {
                self.set_state(ReporterState::Stopped);
                return Err(err);
            }
        };

        self.set_state(ReporterState::Scheduling);
        let now = self.clock.now();
        let schedule =
            ReportSchedule::start(self.config.report_interval, seed.created_at, now, None);
        info!(
            target: "usage::reporter",
            uid = %seed.uid,
            next = %schedule.next(),
            interval = %humantime::format_duration(self.config.report_interval),
            "usage reporting scheduled"
        );
        self.cluster = Some(seed);
        self.schedule = Some(schedule);
        self.set_state(ReporterState::Idle);
        Ok(())
    }

    /// Run one due check at `now`, delivering the next slot if due.
    ///
    /// Fails only when cancelled, or with [`BeaconError::NotInitialized`]
    /// when called before [`Reporter::init`].
    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<TickOutcome> {
        let (Some(seed), Some(schedule)) = (self.cluster.as_ref(), self.schedule.as_mut()) else {
            return Err(BeaconError::NotInitialized(
                "reporter ticked before the cluster seed was resolved".into(),
            ));
        };
        if !schedule.is_due(now) {
            return Ok(TickOutcome::NotDue);
        }

        let interval = schedule.next();
        self.state.send_replace(ReporterState::Reporting);
        let delivered =
            report_usage(self.transmitter.as_ref(), &self.config, seed, interval, cancel).await;
        self.state.send_replace(ReporterState::Idle);

        match delivered {
            Ok(()) => {
                schedule.advance();
                debug!(target: "usage::reporter", %interval, next = %schedule.next(), "usage report sent");
                Ok(TickOutcome::Sent { interval })
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(BeaconError::Report(errors)) => {
                warn!(
                    target: "usage::reporter",
                    %interval,
                    attempts = errors.len(),
                    error = %errors,
                    "failed to send usage report"
                );
                Ok(TickOutcome::Failed {
                    interval,
                    attempts: u32::try_from(errors.len()).unwrap_or(u32::MAX),
                })
            }
            Err(err) => {
                warn!(target: "usage::reporter", %interval, error = %err, "failed to send usage report");
                Ok(TickOutcome::Failed {
                    interval,
                    attempts: 0,
                })
            }
        }
    }

    /// Resolve the seed, then check for due reports every `check_interval`
    /// until `cancel` fires.
    ///
    /// Always ends with [`BeaconError::Cancelled`].
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.cluster.is_none() {
            self.init(cancel).await?;
        }

        let period = self.config.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(ReporterState::Stopped);
                    info!(target: "usage::reporter", "usage reporting stopped");
                    return Err(BeaconError::Cancelled("usage reporter cancelled".into()));
                }
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    if let Err(err) = self.tick(now, cancel).await {
                        self.set_state(ReporterState::Stopped);
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Deliver the report for `interval`, retrying within the send backoff.
///
/// Exhaustion yields [`BeaconError::Report`] with one entry per attempt.
async fn report_usage(
    transmitter: &dyn Transmitter,
    config: &ReporterConfig,
    seed: &ClusterSeed,
    interval: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut backoff = Backoff::new(config.send_backoff, cancel.clone());
    let mut errors = MultiError::new();

    while backoff.ongoing() {
        match transmitter.send(seed, interval).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                info!(
                    target: "usage::reporter",
                    %interval,
                    attempt = backoff.num_retries() + 1,
                    error = %err,
                    "usage report attempt failed"
                );
                errors.push(err);
                backoff.wait().await;
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(backoff.err());
    }
    errors.into_result()
}
