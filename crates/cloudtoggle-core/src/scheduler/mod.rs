//! Recurring per-group start/stop schedules.
//!
//! The scheduler keeps a job table of (group, kind, cron) entries. A single
//! driver task calls [`Scheduler::tick`] at a fixed interval; every due job
//! is handed to the [`ActionDispatcher`] in its own task, outside the table
//! lock. Firing is at-most-once per tick: a job that missed several fire
//! times while the driver was stalled fires once and moves on.

pub mod clock;
pub mod expression;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::orchestrator::{ActionDispatcher, ActionTrigger};
use crate::types::ActionKind;

pub use clock::{Clock, ManualClock, SystemClock};
pub use expression::{parse_timezone, time_to_cron, CronSpec};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

pub type JobId = u64;

/// A registered start/stop pair for one group.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub group_id: String,
    pub start_spec: String,
    pub stop_spec: String,
    pub start_job: JobId,
    pub stop_job: JobId,
}

/// Diagnostic view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub group_id: String,
    pub kind: ActionKind,
    pub expression: String,
    pub next_fire: Option<DateTime<Utc>>,
}

/// A job that was due at a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredJob {
    pub job: JobId,
    pub group_id: String,
    pub kind: ActionKind,
    pub scheduled_for: DateTime<Utc>,
}

struct Job {
    group_id: String,
    kind: ActionKind,
    spec: CronSpec,
    next_fire: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct JobTable {
    next_id: JobId,
    jobs: BTreeMap<JobId, Job>,
    entries: Vec<ScheduleEntry>,
}

impl JobTable {
    fn push(&mut self, job: Job) -> JobId {
        self.next_id += 1;
        self.jobs.insert(self.next_id, job);
        self.next_id
    }
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    dispatcher: Arc<dyn ActionDispatcher>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    tick_interval: Duration,
    table: Mutex<JobTable>,
    driver: Mutex<Option<Driver>>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            clock: Arc::new(SystemClock),
            timezone: Tz::UTC,
            tick_interval: DEFAULT_TICK_INTERVAL,
            table: Mutex::new(JobTable::default()),
            driver: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn table(&self) -> std::sync::MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a start job and a stop job for `group_id`.
    ///
    /// Both specs are validated before anything is registered, so an
    /// invalid stop spec never leaves a lone start job behind.
    pub fn schedule_group(
        &self,
        group_id: &str,
        start_spec: &str,
        stop_spec: &str,
    ) -> Result<ScheduleEntry> {
        let start = CronSpec::parse(start_spec)?;
        let stop = CronSpec::parse(stop_spec)?;
        let now = self.clock.now();

        let mut table = self.table();
        let start_job = table.push(Job {
            group_id: group_id.to_string(),
            kind: ActionKind::Start,
            next_fire: start.next_after(now, self.timezone),
            spec: start,
        });
        let stop_job = table.push(Job {
            group_id: group_id.to_string(),
            kind: ActionKind::Stop,
            next_fire: stop.next_after(now, self.timezone),
            spec: stop,
        });
        let entry = ScheduleEntry {
            group_id: group_id.to_string(),
            start_spec: start_spec.trim().to_string(),
            stop_spec: stop_spec.trim().to_string(),
            start_job,
            stop_job,
        };
        table.entries.push(entry.clone());
        info!(
            group_id,
            start = start_spec,
            stop = stop_spec,
            timezone = %self.timezone,
            "group schedule registered"
        );
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.table().entries.clone()
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.table()
            .jobs
            .iter()
            .map(|(id, job)| JobInfo {
                id: *id,
                group_id: job.group_id.clone(),
                kind: job.kind,
                expression: job.spec.expression().to_string(),
                next_fire: job.next_fire,
            })
            .collect()
    }

    /// Fire every job due at `now` and advance it past `now`.
    ///
    /// Dispatch happens on spawned tasks, so this must be called from
    /// within a Tokio runtime.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<FiredJob> {
        let due: Vec<FiredJob> = {
            let mut table = self.table();
            let mut due = Vec::new();
            for (id, job) in table.jobs.iter_mut() {
                let Some(at) = job.next_fire else { continue };
                if at > now {
                    continue;
                }
                due.push(FiredJob {
                    job: *id,
                    group_id: job.group_id.clone(),
                    kind: job.kind,
                    scheduled_for: at,
                });
                job.next_fire = job.spec.next_after(now, self.timezone);
            }
            due
        };

        for fired in &due {
            let dispatcher = self.dispatcher.clone();
            let fired = fired.clone();
            // Dispatch writes the action record, so it runs on the blocking pool.
            tokio::task::spawn_blocking(move || {
                match dispatcher.dispatch(&fired.group_id, fired.kind, ActionTrigger::Scheduled) {
                    Ok(action_id) => info!(
                        job = fired.job,
                        group_id = %fired.group_id,
                        kind = %fired.kind,
                        action_id = %action_id,
                        "scheduled action dispatched"
                    ),
                    Err(e) => error!(
                        job = fired.job,
                        group_id = %fired.group_id,
                        kind = %fired.kind,
                        error = %e,
                        "scheduled action failed to dispatch"
                    ),
                }
            });
        }
        due
    }

    /// Start the driver loop. Calling `start` on a running scheduler is a
    /// no-op.
    pub fn start(self: &Arc<Self>) {
        let mut driver = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        if driver.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.tick_interval;
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(scheduler) = weak.upgrade() else { break };
                        let fired = scheduler.tick(scheduler.clock.now());
                        if !fired.is_empty() {
                            debug!(count = fired.len(), "scheduler tick fired jobs");
                        }
                    }
                }
            }
            debug!("scheduler driver stopped");
        });
        info!(interval_ms = interval.as_millis() as u64, "scheduler started");
        *driver = Some(Driver { cancel, handle });
    }

    /// Stop future firings. Actions already dispatched keep running.
    pub fn stop(&self) {
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(d) = driver {
            d.cancel.cancel();
            info!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|d| !d.handle.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(d) = self
            .driver
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            d.cancel.cancel();
        }
    }
}
