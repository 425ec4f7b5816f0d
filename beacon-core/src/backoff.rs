//! Capped exponential backoff governed by a cancellation token.
//!
//! One policy type drives every retry loop in the crate: the unbounded slow
//! retry used while electing and fetching the cluster seed, and the bounded
//! fast retry used when transmitting a report.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::BeaconError;

/// Retry delay bounds and attempt cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay handed out by [`Backoff::wait`].
    #[serde(with = "crate::duration_serde")]
    pub min_backoff: Duration,
    /// Ceiling the doubling delay never exceeds.
    #[serde(with = "crate::duration_serde")]
    pub max_backoff: Duration,
    /// Maximum attempts before giving up. `0` retries until cancelled.
    #[serde(default)]
    pub max_retries: u32,
}

impl BackoffConfig {
    /// Unbounded 1s→60s policy used while electing a leader.
    pub const fn election() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_retries: 0,
        }
    }

    /// Unbounded 1s→60s policy used while fetching the published seed.
    pub const fn seed_fetch() -> Self {
        Self::election()
    }

    /// Bounded 1s→30s policy, five attempts, used per report.
    pub const fn report_send() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: 5,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_retries == 0
    }

    pub fn validate(&self, name: &str) -> crate::error::Result<()> {
        if self.min_backoff > self.max_backoff {
            return Err(BeaconError::InvalidConfig(format!(
                "{name}: min_backoff ({:?}) exceeds max_backoff ({:?})",
                self.min_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::election()
    }
}

/// Stateful retry helper.
///
/// ```ignore
/// let mut backoff = Backoff::new(BackoffConfig::report_send(), cancel.clone());
/// while backoff.ongoing() {
///     match attempt().await {
///         Ok(v) => return Ok(v),
///         Err(_) => backoff.wait().await,
///     }
/// }
/// Err(backoff.err())
/// ```
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    cancel: CancellationToken,
    num_retries: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            num_retries: 0,
            next_delay: config.min_backoff.min(config.max_backoff),
        }
    }

    /// Whether another attempt is permitted.
    pub fn ongoing(&self) -> bool {
        !self.cancel.is_cancelled()
            && (self.config.is_unbounded()
                || self.num_retries < self.config.max_retries)
    }

    /// Number of waits performed so far.
    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }

    /// Delay the next [`Backoff::wait`] will sleep for.
    pub fn current_delay(&self) -> Duration {
        self.next_delay
    }

    /// Start over from `min_backoff` with a fresh attempt budget.
    pub fn reset(&mut self) {
        self.num_retries = 0;
        self.next_delay = self.config.min_backoff.min(self.config.max_backoff);
    }

    /// Count one retry, then sleep for the current delay unless the attempt
    /// budget is spent or the token fires first.
    pub async fn wait(&mut self) {
        let delay = self.advance();
        self.num_retries = self.num_retries.saturating_add(1);
        if !self.ongoing() {
            return;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Why retrying stopped. Only meaningful once [`Backoff::ongoing`]
    /// returns false.
    pub fn err(&self) -> BeaconError {
        if self.cancel.is_cancelled() {
            BeaconError::Cancelled("retry loop cancelled".into())
        } else {
            BeaconError::RetriesExhausted(self.num_retries)
        }
    }

    fn advance(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = delay.saturating_mul(2).min(self.config.max_backoff);
        delay
    }
}
