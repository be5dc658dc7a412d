//! Time-based triggering.
//!
//! Two mechanisms live here:
//!
//! - **Interval timers**: one Tokio task per `schedule` trigger, started at
//!   registration and stopped through its [`CancellationToken`]. Each timer
//!   fires at most once per period, so it needs no dedup.
//! - **Clock triggers**: evaluated by the periodic tick. A `time` trigger is
//!   due when "now" lies in `[instant, instant + tolerance)` for today's
//!   instant *and* the workflow's last execution started before that
//!   instant. The last-start bookkeeping is what keeps several ticks inside
//!   the same window from firing twice.
//!
//! Cancelling a timer stops future firing only; executions already spawned
//! by it run to completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::EngineError;

// ---------------------------------------------------------------------------
// ClockTime
// ---------------------------------------------------------------------------

/// A wall-clock time of day from a `time` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    /// Parse `HH:MM` (24-hour; a single-digit hour is accepted).
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidClockTime(raw.to_owned());
        let (h, m) = raw.trim().split_once(':').ok_or_else(invalid)?;
        if m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Whether a clock trigger at `at` is due at `now`.
///
/// The trigger instant is `at` on `now`'s calendar day in `now`'s timezone.
/// Due means `now ∈ [instant, instant + tolerance)` and `last_started` (if
/// any) is before the instant.
pub fn clock_due<Tz: TimeZone>(
    at: ClockTime,
    now: &DateTime<Tz>,
    last_started: Option<DateTime<Utc>>,
    tolerance: chrono::Duration,
) -> bool {
    let Some(naive) = now.date_naive().and_hms_opt(at.hour, at.minute, 0) else {
        return false;
    };
    // A time skipped by a DST jump has no instant that day.
    let Some(instant) = now.timezone().from_local_datetime(&naive).earliest() else {
        return false;
    };

    let now = now.with_timezone(&Utc);
    let instant = instant.with_timezone(&Utc);
    let in_window = now >= instant && now < instant + tolerance;

    in_window && last_started.map_or(true, |last| last < instant)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Callback run when an interval timer fires: `(workflow_id, interval_ms)`.
pub type FireFn = Arc<dyn Fn(String, u64) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Scheduler {
    tolerance: chrono::Duration,
    fire: FireFn,
    timers: Mutex<HashMap<String, Vec<CancellationToken>>>,
    last_started: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(tolerance: Duration, fire: FireFn) -> Self {
        Self {
            tolerance: chrono::Duration::from_std(tolerance)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            fire,
            timers: Mutex::new(HashMap::new()),
            last_started: Mutex::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Interval timers
    // -----------------------------------------------------------------------

    /// Start a repeating timer for `workflow_id`. The first fire is one
    /// full `period` from now.
    ///
    /// # Errors
    /// [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn schedule_interval(&self, workflow_id: &str, period: Duration) -> Result<(), EngineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let fire = self.fire.clone();
        let id = workflow_id.to_owned();
        let interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("interval timer fired for workflow '{}'", id);
                        tokio::spawn(fire(id.clone(), interval_ms));
                    }
                }
            }
            debug!("interval timer for workflow '{}' stopped", id);
        });

        self.timers
            .lock()
            .entry(workflow_id.to_owned())
            .or_default()
            .push(token);
        Ok(())
    }

    /// Cancel every timer of `workflow_id`; returns how many were stopped.
    pub fn cancel(&self, workflow_id: &str) -> usize {
        let tokens = self.timers.lock().remove(workflow_id).unwrap_or_default();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    /// Live timers for `workflow_id`.
    pub fn timer_count(&self, workflow_id: &str) -> usize {
        self.timers.lock().get(workflow_id).map_or(0, Vec::len)
    }

    /// Live timers across all workflows.
    pub fn active_timers(&self) -> usize {
        self.timers.lock().values().map(Vec::len).sum()
    }

    /// Cancel every timer.
    pub fn shutdown(&self) {
        let timers: Vec<_> = self.timers.lock().drain().collect();
        for (_, tokens) in timers {
            for token in tokens {
                token.cancel();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Last-execution bookkeeping
    // -----------------------------------------------------------------------

    /// Note that an execution of `workflow_id` started at `at`. Only moves
    /// forward.
    pub fn record_start(&self, workflow_id: &str, at: DateTime<Utc>) {
        let mut last = self.last_started.lock();
        let entry = last.entry(workflow_id.to_owned()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    pub fn last_started(&self, workflow_id: &str) -> Option<DateTime<Utc>> {
        self.last_started.lock().get(workflow_id).copied()
    }

    /// Drop bookkeeping for a deleted workflow.
    pub fn forget(&self, workflow_id: &str) {
        self.last_started.lock().remove(workflow_id);
    }

    /// Check a clock trigger and, if due, record `now` as the workflow's last
    /// start in the same critical section. Returns whether the caller should
    /// fire.
    pub fn claim_clock<Tz: TimeZone>(&self, workflow_id: &str, at: ClockTime, now: &DateTime<Tz>) -> bool {
        let mut last = self.last_started.lock();
        let due = clock_due(at, now, last.get(workflow_id).copied(), self.tolerance);
        if due {
            let now = now.with_timezone(&Utc);
            let entry = last.entry(workflow_id.to_owned()).or_insert(now);
            if now > *entry {
                *entry = now;
            }
        }
        due
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tolerance", &self.tolerance)
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

/// Run `on_tick` every `period` until `token` is cancelled.
///
/// The first tick happens immediately. `on_tick` must not block; it is
/// expected to spawn whatever work it finds.
pub fn spawn_ticker<F>(period: Duration, token: CancellationToken, on_tick: F) -> Result<JoinHandle<()>, EngineError>
where
    F: Fn() -> bool + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
    Ok(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if !on_tick() {
                        warn!("scheduler tick target dropped; stopping");
                        break;
                    }
                }
            }
        }
    }))
}
