//! Calendar watcher background task.
//!
//! Wakes on a fixed period, looks at the upcoming interval and tells the
//! observers whether something is in progress. At most one action fires
//! per tick, checked in this order:
//!
//! 1. the local day changed since the last sync: sync again
//! 2. nothing upcoming: "end" (absence cooldown)
//! 3. upcoming not started yet: "end" (absence cooldown)
//! 4. upcoming in progress: "start" (start cooldown)
//! 5. upcoming finished: "end" without cooldown, then move the pointer

use chrono::{DateTime, Utc};
use shared_types::{NotificationKind, Phase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::services::{Scheduler, Throttle};
use crate::sinks::Observers;

const RESYNC: &str = "resync";

/// Configuration for the calendar watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How often the schedule is checked (default: 1 second)
    pub tick_interval: Duration,
    /// Minimum spacing between retries of a failed day-rollover sync
    pub resync_retry: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            resync_retry: Duration::from_secs(60),
        }
    }
}

/// What a single tick observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Resynced,
    ResyncFailed,
    NoUpcoming { notified: bool },
    YetToStart { notified: bool },
    InProgress { notified: bool },
    Ended,
}

pub struct CalendarWatcher {
    scheduler: Arc<Scheduler>,
    observers: Observers,
    config: WatcherConfig,
    resync_gate: Throttle<&'static str>,
}

impl CalendarWatcher {
    pub fn new(scheduler: Arc<Scheduler>, observers: Observers, config: WatcherConfig) -> Self {
        let resync_gate = Throttle::new([(RESYNC, config.resync_retry)]);
        Self {
            scheduler,
            observers,
            config,
            resync_gate,
        }
    }

    /// Run until `stop` flips to true.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            "Calendar watcher started (tick: {:?}, observers: {})",
            self.config.tick_interval,
            self.observers.len()
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*stop.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick(Utc::now()).await;
                    tracing::debug!("Watcher tick: {:?}", outcome);
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Stop signal sender dropped");
                        break;
                    }
                }
            }
        }

        tracing::info!("Calendar watcher stopped");
    }

    /// Evaluate the schedule once at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let today = self.scheduler.local_day(now);
        if self.scheduler.day().await != Some(today) && self.resync_gate.allow(RESYNC) {
            tracing::info!(
                "Day changed to {} ({}), syncing calendar",
                today,
                self.scheduler.timezone()
            );
            return match self.scheduler.sync_at(now).await {
                Ok(summary) => {
                    self.resync_gate.reset(RESYNC);
                    tracing::info!(
                        "Synced {} events into {} intervals",
                        summary.fetched,
                        summary.merged
                    );
                    TickOutcome::Resynced
                }
                Err(e) => {
                    tracing::error!(
                        "Day rollover sync failed, retrying in {:?}: {:#}",
                        self.config.resync_retry,
                        anyhow::Error::from(e)
                    );
                    TickOutcome::ResyncFailed
                }
            };
        }

        let Some(upcoming) = self.scheduler.upcoming().await else {
            let notified = self.notify_absence().await;
            return TickOutcome::NoUpcoming { notified };
        };

        match upcoming.phase(now) {
            Phase::YetToStart => {
                let notified = self.notify_absence().await;
                TickOutcome::YetToStart { notified }
            }
            Phase::InProgress => {
                let notified = self.allow(NotificationKind::Start);
                if notified {
                    self.observers.interval_started(&upcoming).await;
                }
                TickOutcome::InProgress { notified }
            }
            Phase::Ended => {
                self.observers.interval_ended(Some(&upcoming)).await;
                match self.scheduler.advance(now).await {
                    Some(next) => tracing::info!("Next interval is {:?}", next.summary),
                    None => tracing::info!("No more intervals today"),
                }
                TickOutcome::Ended
            }
        }
    }

    async fn notify_absence(&self) -> bool {
        if !self.allow(NotificationKind::Absence) {
            return false;
        }
        self.observers.interval_ended(None).await;
        true
    }

    fn allow(&self, kind: NotificationKind) -> bool {
        let throttle = self.scheduler.throttle();
        if throttle.allow(kind) {
            return true;
        }
        tracing::trace!(
            "{} notification held back for {:?}",
            kind.as_str(),
            throttle.remaining(kind)
        );
        false
    }
}
