//! Report due-time arithmetic.
//!
//! Report slots are phase-locked to the seed's `created_at`: every process
//! of a cluster lands on the same wall-clock boundaries, while clusters
//! created at different times land on different offsets.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Smallest `created_at + k * interval` (k >= 0) that is `>= now`.
///
/// A zero interval has no slots after `created_at`; `now` is returned so
/// callers never spin on a past time.
pub fn next_report_time(
    interval: Duration,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if now <= created_at {
        return created_at;
    }
    let interval_ns = interval.as_nanos();
    if interval_ns == 0 {
        return now;
    }

    let elapsed = now - created_at;
    let elapsed_ns = u128::try_from(elapsed.num_seconds()).unwrap_or(0) * 1_000_000_000
        + u128::from(elapsed.subsec_nanos().unsigned_abs());
    let slots = elapsed_ns.div_ceil(interval_ns);

    offset(created_at, slots * interval_ns)
}

fn offset(base: DateTime<Utc>, nanos: u128) -> DateTime<Utc> {
    let secs = i64::try_from(nanos / 1_000_000_000).unwrap_or(i64::MAX);
    let subsec = (nanos % 1_000_000_000) as u32;
    TimeDelta::new(secs, subsec)
        .and_then(|delta| base.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn to_delta(interval: Duration) -> TimeDelta {
    TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX)
}

/// Next slot to report and the last slot reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchedule {
    interval: Duration,
    next: DateTime<Utc>,
    last_report: DateTime<Utc>,
}

impl ReportSchedule {
    /// Schedule for a process that starts at `now`.
    ///
    /// Without a previous report the last slot is assumed to be the one just
    /// before `next`, so the first check fires at `next`.
    pub fn start(
        interval: Duration,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
        last_report: Option<DateTime<Utc>>,
    ) -> Self {
        let next = next_report_time(interval, created_at, now);
        let last_report = last_report.unwrap_or_else(|| {
            next.checked_sub_signed(to_delta(interval)).unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        Self {
            interval,
            next,
            last_report,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next(&self) -> DateTime<Utc> {
        self.next
    }

    pub fn last_report(&self) -> DateTime<Utc> {
        self.last_report
    }

    /// Due when `now` sits exactly on the next slot or a full interval has
    /// passed since the last report.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now == self.next || now - self.last_report >= to_delta(self.interval)
    }

    /// Mark `next` as reported and move to the following slot.
    pub fn advance(&mut self) {
        self.last_report = self.next;
        self.next = self
            .next
            .checked_add_signed(to_delta(self.interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}
