//! Background retention sweep for aged messages.
//!
//! Every message older than `max_age_hours` is soft-deleted in one bulk
//! update. The sweep runs at the top of every N-th hour, optionally on a fast
//! fixed interval, and on demand from the admin console. At most one sweep
//! runs at a time per process; overlapping triggers are skipped, not queued.
//!
//! There is no cross-process coordination. Two server instances sharing a
//! database may both sweep; the update is idempotent so the only cost is a
//! duplicated report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::chat::store;
use crate::config::RetentionConfig;
use crate::db::{run_blocking, DbPool};
use crate::error::ChatResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepTrigger {
    Scheduled,
    Interval,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub trigger: SweepTrigger,
    pub deleted: usize,
    pub cutoff: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the guard.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStatus {
    pub running: bool,
    pub max_age_hours: u32,
    pub sweep_every_hours: u32,
    pub fast_interval_secs: Option<u64>,
    pub last_report: Option<SweepReport>,
    pub next_scheduled_run: DateTime<Utc>,
    pub pending_expired: i64,
}

pub struct RetentionSweeper {
    db: DbPool,
    max_age: Duration,
    every_hours: u32,
    fast_interval: Option<StdDuration>,
    running: Arc<AtomicBool>,
    last_report: Mutex<Option<SweepReport>>,
}

/// Held for the duration of one sweep; releases the flag on drop, including
/// when the sweep errors out. Owned so it can travel with the blocking work
/// and outlive a caller that stopped waiting.
pub struct SweepGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl RetentionSweeper {
    pub fn new(db: DbPool, config: &RetentionConfig) -> Self {
        Self {
            db,
            max_age: Duration::hours(i64::from(config.max_age_hours)),
            every_hours: config.sweep_every_hours.max(1),
            fast_interval: config
                .fast_interval_secs
                .filter(|secs| *secs > 0)
                .map(StdDuration::from_secs),
            running: Arc::new(AtomicBool::new(false)),
            last_report: Mutex::new(None),
        }
    }

    pub fn try_begin(&self) -> Option<SweepGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard {
                flag: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age
    }

    /// Run one sweep unless another is already in flight.
    ///
    /// The guard moves into the blocking task, so dropping this future while
    /// the update is still running does not let a second sweep start.
    pub async fn run_now(&self, trigger: SweepTrigger) -> ChatResult<SweepOutcome> {
        let Some(guard) = self.try_begin() else {
            tracing::info!(?trigger, "Retention sweep already running, skipping");
            return Ok(SweepOutcome::Skipped);
        };

        let started_at = Utc::now();
        let cutoff = self.cutoff(started_at);
        let deleted = run_blocking(&self.db, move |db| {
            let _guard = guard;
            store::soft_delete_older_than(db, cutoff, started_at)
        })
        .await?;

        let report = SweepReport {
            trigger,
            deleted,
            cutoff,
            started_at,
            finished_at: Utc::now(),
        };
        if deleted > 0 {
            tracing::info!(?trigger, deleted, cutoff = %cutoff, "Retention sweep soft-deleted messages");
        } else {
            tracing::debug!(?trigger, "Retention sweep found nothing to delete");
        }
        *self.last_report.lock().await = Some(report.clone());

        Ok(SweepOutcome::Completed(report))
    }

    /// Scheduled entry point. Failures are logged and the schedule carries on.
    pub async fn run_logged(&self, trigger: SweepTrigger) {
        if let Err(e) = self.run_now(trigger).await {
            tracing::error!(?trigger, error = %e, "Retention sweep failed");
        }
    }

    /// Next top-of-hour strictly after `now` whose hour is a multiple of the
    /// configured period.
    pub fn next_scheduled_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut next = now
            .duration_trunc(Duration::hours(1))
            .unwrap_or(now)
            + Duration::hours(1);
        for _ in 0..24 {
            if next.hour() % self.every_hours == 0 {
                break;
            }
            next += Duration::hours(1);
        }
        next
    }

    /// Messages the next sweep would soft-delete if it ran now.
    pub async fn pending_expired(&self) -> ChatResult<i64> {
        let cutoff = self.cutoff(Utc::now());
        run_blocking(&self.db, move |db| store::count_expired(db, cutoff)).await
    }

    pub async fn status(&self) -> ChatResult<SweepStatus> {
        let pending_expired = self.pending_expired().await?;
        Ok(SweepStatus {
            running: self.is_running(),
            max_age_hours: u32::try_from(self.max_age.num_hours()).unwrap_or(u32::MAX),
            sweep_every_hours: self.every_hours,
            fast_interval_secs: self.fast_interval.map(|d| d.as_secs()),
            last_report: self.last_report.lock().await.clone(),
            next_scheduled_run: self.next_scheduled_run(Utc::now()),
            pending_expired,
        })
    }

    /// Spawn the schedule. Stops when `shutdown` flips to true or its sender
    /// is dropped.
    pub fn spawn_schedule(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut fast = self.fast_interval.map(|period| {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });

            tracing::info!(
                max_age_hours = self.max_age.num_hours(),
                every_hours = self.every_hours,
                fast_interval_secs = ?self.fast_interval.map(|d| d.as_secs()),
                "Retention schedule started"
            );

            loop {
                let now = Utc::now();
                let wait = (self.next_scheduled_run(now) - now)
                    .to_std()
                    .unwrap_or_default();

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        self.run_logged(SweepTrigger::Scheduled).await;
                    }
                    _ = next_tick(&mut fast) => {
                        self.run_logged(SweepTrigger::Interval).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Retention schedule stopped");
        })
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
