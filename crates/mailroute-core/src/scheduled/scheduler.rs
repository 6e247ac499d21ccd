//! Reset scheduler - hourly and daily counter zeroing
//!
//! Owned by the process lifecycle with explicit start()/stop(), never
//! ambient globals. The hourly reset fires every 60 minutes from start;
//! the daily reset targets local midnight and recomputes the next
//! midnight on every firing, so it stays aligned across daylight-saving
//! transitions instead of drifting on a fixed 24-hour period.

use crate::quota::{QuotaLedger, ResetScope};
use chrono::{DateTime, Duration, Local, TimeZone};
use mailroute_storage::repository::EmailLogRepositoryTrait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{error, info};

/// Clock abstraction so tests can drive the schedule deterministically
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock implementation
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// The next local midnight strictly after `now`.
///
/// Falls back to `now + 24h` only when the timezone has no
/// representable midnight on the next day (a DST gap exactly at 00:00).
pub fn next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> DateTime<Tz> {
    let next_day = now.date_naive() + Duration::days(1);
    next_day
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| now.clone() + Duration::hours(24))
}

/// Log retention policy run alongside the daily reset
#[derive(Clone)]
struct Retention {
    logs: Arc<dyn EmailLogRepositoryTrait>,
    days: i64,
}

/// Scheduler for periodic counter resets
pub struct ResetScheduler {
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
    retention: Option<Retention>,
    handles: Vec<JoinHandle<()>>,
}

impl ResetScheduler {
    /// Create a new scheduler
    pub fn new(ledger: QuotaLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            retention: None,
            handles: Vec::new(),
        }
    }

    /// Purge email logs older than `days` after every daily reset.
    ///
    /// This is the only path that deletes tracking data; events and
    /// link mappings go with their log rows.
    pub fn with_log_retention(mut self, logs: Arc<dyn EmailLogRepositoryTrait>, days: i64) -> Self {
        self.retention = Some(Retention { logs, days });
        self
    }

    /// Spawn the hourly and daily reset tasks.
    ///
    /// Idempotent start is not supported; call once per process.
    pub fn start(&mut self) {
        info!("starting quota reset scheduler");

        let hourly_ledger = self.ledger.clone();
        self.handles.push(tokio::spawn(async move {
            // First hourly reset one hour from start, not immediately.
            let period = std::time::Duration::from_secs(60 * 60);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = hourly_ledger.reset_counters(ResetScope::Hourly).await {
                    error!("hourly counter reset failed: {}", e);
                }
            }
        }));

        let daily_ledger = self.ledger.clone();
        let clock = self.clock.clone();
        let retention = self.retention.clone();
        self.handles.push(tokio::spawn(async move {
            loop {
                let now = clock.now();
                let target = next_midnight(now.clone());
                let wait = (target - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(1));

                tokio::time::sleep(wait).await;

                if let Err(e) = daily_ledger.reset_counters(ResetScope::Daily).await {
                    error!("daily counter reset failed: {}", e);
                }

                if let Some(retention) = &retention {
                    match retention.logs.purge_older_than(retention.days).await {
                        Ok(purged) if purged > 0 => {
                            info!(purged, days = retention.days, "purged expired email logs")
                        }
                        Ok(_) => {}
                        Err(e) => error!("email log purge failed: {}", e),
                    }
                }
            }
        }));
    }

    /// Abort the reset tasks. Reachable from the process teardown path.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("quota reset scheduler stopped");
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_next_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 12).unwrap();
        let next = next_midnight(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_midnight_just_before_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(
            next_midnight(now),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_midnight_at_midnight_is_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(
            next_midnight(now),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_midnight_fixed_offset() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = next_midnight(now);
        assert_eq!(
            next.naive_local(),
            NaiveDate::from_ymd_opt(2024, 6, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_recomputation_does_not_drift() {
        // Firing at (or a hair after) midnight targets the following
        // midnight, exactly 24h away in a fixed-offset zone - never a
        // slow accumulation of scheduling latency.
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let fired_at = tz.with_ymd_and_hms(2024, 6, 2, 0, 0, 3).unwrap();
        let next = next_midnight(fired_at);
        assert_eq!(
            next,
            tz.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
        );
    }
}
