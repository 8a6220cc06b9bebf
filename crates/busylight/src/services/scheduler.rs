//! Shared schedule state and the sync that rebuilds it.
//!
//! The consolidated list, the upcoming pointer and the day marker live
//! behind one lock and are only ever replaced together. Syncs are
//! serialised by a second lock held for the whole fetch, so two syncs
//! never interleave while the poll loop can keep reading the last
//! complete snapshot.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use shared_types::{Interval, NotificationKind, SourceEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::consolidation::{consolidate, numbered};
use super::throttle::Throttle;
use super::upcoming::select_upcoming;
use crate::calendar_client::EventSource;
use crate::error::SyncError;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub timezone: Tz,
    /// Cooldown of "interval started" notifications
    pub start_cooldown: Duration,
    /// Cooldown of "nothing in progress" notifications
    pub absence_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            start_cooldown: Duration::from_secs(60),
            absence_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct ScheduleState {
    intervals: Vec<Interval>,
    upcoming: Option<usize>,
    day: Option<NaiveDate>,
}

/// Consistent copy of the schedule at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub day: Option<NaiveDate>,
    pub intervals: Vec<Interval>,
    pub upcoming: Option<Interval>,
}

/// What a successful sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub day: NaiveDate,
    pub fetched: usize,
    pub cancelled: usize,
    pub rejected: usize,
    pub merged: usize,
    pub upcoming: Option<Interval>,
}

pub struct Scheduler {
    source: Arc<dyn EventSource>,
    timezone: Tz,
    state: Mutex<ScheduleState>,
    sync_lock: Mutex<()>,
    throttle: Throttle<NotificationKind>,
}

impl Scheduler {
    pub fn new(source: Arc<dyn EventSource>, config: SchedulerConfig) -> Self {
        Self {
            source,
            timezone: config.timezone,
            state: Mutex::new(ScheduleState::default()),
            sync_lock: Mutex::new(()),
            throttle: Throttle::new([
                (NotificationKind::Start, config.start_cooldown),
                (NotificationKind::Absence, config.absence_cooldown),
            ]),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn throttle(&self) -> &Throttle<NotificationKind> {
        &self.throttle
    }

    /// Calendar date of `now` in the configured timezone.
    pub fn local_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub async fn sync(&self) -> Result<SyncSummary, SyncError> {
        self.sync_at(Utc::now()).await
    }

    /// Fetch the day containing `now`, rebuild the consolidated list and
    /// upcoming pointer, and re-arm both notification cooldowns.
    ///
    /// On error nothing is touched: the previous schedule stays current.
    pub async fn sync_at(&self, now: DateTime<Utc>) -> Result<SyncSummary, SyncError> {
        let _sync_guard = self.sync_lock.lock().await;

        let local_now = now.with_timezone(&self.timezone);
        let day = local_now.date_naive();
        let (time_min, time_max) =
            day_bounds(day, &self.timezone).ok_or(SyncError::DayBounds(day))?;

        let events = self
            .source
            .list_events(time_min, time_max)
            .await
            .map_err(|source| SyncError::Fetch { day, source })?;

        let fetched = events.len();
        let (intervals, cancelled, rejected) = ingest(events, &local_now);
        let intervals = consolidate(intervals);
        let upcoming = select_upcoming(&intervals, now);

        tracing::info!(
            "Merged intervals for {} ({}): {}",
            day,
            intervals.len(),
            numbered(&intervals)
        );

        let summary = SyncSummary {
            day,
            fetched,
            cancelled,
            rejected,
            merged: intervals.len(),
            upcoming: upcoming.map(|idx| intervals[idx].clone()),
        };

        {
            let mut state = self.state.lock().await;
            *state = ScheduleState {
                intervals,
                upcoming,
                day: Some(day),
            };
            self.throttle.reset_all();
        }

        match &summary.upcoming {
            Some(next) => tracing::info!("Upcoming interval is {:?}", next.summary),
            None => tracing::info!("No upcoming interval for {}", day),
        }
        Ok(summary)
    }

    /// Recompute the upcoming pointer after the tracked interval ended.
    ///
    /// The start cooldown belonged to the interval that just finished, so
    /// it is re-armed together with the pointer.
    pub async fn advance(&self, now: DateTime<Utc>) -> Option<Interval> {
        let mut state = self.state.lock().await;
        state.upcoming = select_upcoming(&state.intervals, now);
        self.throttle.reset(NotificationKind::Start);
        state.upcoming.map(|idx| state.intervals[idx].clone())
    }

    pub async fn upcoming(&self) -> Option<Interval> {
        let state = self.state.lock().await;
        state.upcoming.map(|idx| state.intervals[idx].clone())
    }

    /// Day the current schedule was fetched for, if any sync succeeded.
    pub async fn day(&self) -> Option<NaiveDate> {
        self.state.lock().await.day
    }

    pub async fn snapshot(&self) -> ScheduleSnapshot {
        let state = self.state.lock().await;
        ScheduleSnapshot {
            day: state.day,
            intervals: state.intervals.clone(),
            upcoming: state.upcoming.map(|idx| state.intervals[idx].clone()),
        }
    }
}

/// Local 00:00:00 and 23:59:59 of `day`, as UTC instants.
pub fn day_bounds(day: NaiveDate, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
    let start = tz.from_local_datetime(&day.and_time(NaiveTime::MIN)).earliest()?;
    let end = tz.from_local_datetime(&day.and_time(end_of_day)).latest()?;
    Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

/// Drop cancelled events and turn the rest into intervals, skipping any
/// record that cannot be placed. Returns the intervals plus the number of
/// cancelled and rejected records.
fn ingest<Z: TimeZone>(events: Vec<SourceEvent>, now: &DateTime<Z>) -> (Vec<Interval>, usize, usize) {
    let mut intervals = Vec::with_capacity(events.len());
    let mut cancelled = 0;
    let mut rejected = 0;

    for event in events {
        if event.is_cancelled() {
            cancelled += 1;
            continue;
        }
        match Interval::from_source(&event, now) {
            Ok(interval) => intervals.push(interval),
            Err(e) => {
                tracing::warn!("Skipping calendar event: {}", e);
                rejected += 1;
            }
        }
    }

    (intervals, cancelled, rejected)
}


#[cfg(test)]
mod tests {
    use super::testing::{event, FakeSource};
    use super::*;
    use chrono_tz::America::New_York;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap()
    }

    fn scheduler(source: Arc<FakeSource>) -> Scheduler {
        Scheduler::new(source, SchedulerConfig::default())
    }

    #[test]
    fn test_day_bounds_in_utc() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let (start, end) = day_bounds(day, &Tz::UTC).unwrap();
        assert_eq!(start, at(0, 0));
        assert_eq!(end, at(23, 59) + chrono::Duration::seconds(59));
    }

    #[test]
    fn test_day_bounds_follow_timezone() {
        // New York is UTC-4 on 2024-03-14 (DST started on the 10th).
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let (start, end) = day_bounds(day, &New_York).unwrap();
        assert_eq!(start, at(4, 0));
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 15, 3, 59, 59).unwrap());
    }

    #[tokio::test]
    async fn test_sync_builds_schedule() {
        let source = Arc::new(FakeSource::with_events(vec![
            event("late", at(11, 0), at(12, 0)),
            event("early", at(9, 0), at(10, 0)),
            event("overlap", at(9, 45), at(10, 30)),
        ]));
        let scheduler = scheduler(source.clone());

        let summary = scheduler.sync_at(at(8, 0)).await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.merged, 2);
        assert_eq!(summary.upcoming.as_ref().unwrap().summary, "early:overlap");

        let snapshot = scheduler.snapshot().await;
        assert_eq!(snapshot.day, NaiveDate::from_ymd_opt(2024, 3, 14));
        assert_eq!(snapshot.intervals.len(), 2);
        assert_eq!(snapshot.upcoming, summary.upcoming);
        assert_eq!(
            *source.last_window.lock().unwrap(),
            Some((at(0, 0), at(23, 59) + chrono::Duration::seconds(59)))
        );
    }

    #[tokio::test]
    async fn test_sync_skips_cancelled_and_invalid_events() {
        let mut cancelled = event("cancelled", at(9, 0), at(10, 0));
        cancelled.status = Some("cancelled".to_string());
        let mut all_day = event("all-day", at(0, 0), at(0, 0));
        all_day.start = None;
        all_day.end = None;

        let source = Arc::new(FakeSource::with_events(vec![
            cancelled,
            all_day,
            event("inverted", at(12, 0), at(11, 0)),
            event("real", at(13, 0), at(14, 0)),
        ]));
        let scheduler = scheduler(source);

        let summary = scheduler.sync_at(at(8, 0)).await.unwrap();
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.merged, 1);
        assert_eq!(summary.upcoming.unwrap().summary, "real");
    }

    #[tokio::test]
    async fn test_sync_normalises_recurring_start() {
        let mut standup = event(
            "standup",
            at(9, 0) - chrono::Duration::days(14),
            at(9, 15),
        );
        standup.recurring = true;
        let scheduler = scheduler(Arc::new(FakeSource::with_events(vec![standup])));

        let summary = scheduler.sync_at(at(8, 0)).await.unwrap();
        let upcoming = summary.upcoming.unwrap();
        assert_eq!((upcoming.start, upcoming.end), (at(9, 0), at(9, 15)));
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_previous_schedule() {
        let source = Arc::new(FakeSource::with_events(vec![event(
            "review",
            at(9, 0),
            at(10, 0),
        )]));
        let scheduler = scheduler(source.clone());
        scheduler.sync_at(at(8, 0)).await.unwrap();
        let before = scheduler.snapshot().await;

        source.set_events(Vec::new());
        source.set_failing(true);
        let err = scheduler.sync_at(at(8, 30)).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
        assert_eq!(scheduler.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_sync_replaces_schedule_wholesale() {
        let source = Arc::new(FakeSource::with_events(vec![
            event("a", at(9, 0), at(10, 0)),
            event("b", at(11, 0), at(12, 0)),
        ]));
        let scheduler = scheduler(source.clone());
        scheduler.sync_at(at(8, 0)).await.unwrap();

        source.set_events(vec![event("c", at(15, 0), at(16, 0))]);
        scheduler.sync_at(at(8, 0)).await.unwrap();

        let snapshot = scheduler.snapshot().await;
        assert_eq!(snapshot.intervals.len(), 1);
        assert_eq!(snapshot.upcoming.unwrap().summary, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_rearms_throttles() {
        let scheduler = scheduler(Arc::new(FakeSource::default()));
        assert!(scheduler.throttle().allow(NotificationKind::Start));
        assert!(scheduler.throttle().allow(NotificationKind::Absence));
        assert!(!scheduler.throttle().allow(NotificationKind::Start));

        scheduler.sync_at(at(8, 0)).await.unwrap();
        assert!(scheduler.throttle().allow(NotificationKind::Start));
        assert!(scheduler.throttle().allow(NotificationKind::Absence));
    }

    #[tokio::test]
    async fn test_advance_moves_past_ended_interval() {
        let source = Arc::new(FakeSource::with_events(vec![
            event("a", at(9, 0), at(10, 0)),
            event("b", at(11, 0), at(12, 0)),
        ]));
        let scheduler = scheduler(source);
        scheduler.sync_at(at(8, 0)).await.unwrap();

        assert_eq!(scheduler.advance(at(10, 30)).await.unwrap().summary, "b");
        assert_eq!(scheduler.upcoming().await.unwrap().summary, "b");
        assert_eq!(scheduler.advance(at(12, 30)).await, None);
        assert_eq!(scheduler.upcoming().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_rearms_start_cooldown_only() {
        let source = Arc::new(FakeSource::with_events(vec![
            event("a", at(9, 0), at(10, 0)),
            event("b", at(10, 1), at(11, 0)),
        ]));
        let scheduler = scheduler(source);
        scheduler.sync_at(at(8, 0)).await.unwrap();
        assert!(scheduler.throttle().allow(NotificationKind::Start));
        assert!(scheduler.throttle().allow(NotificationKind::Absence));

        scheduler.advance(at(10, 0) + chrono::Duration::seconds(1)).await;
        assert!(scheduler.throttle().allow(NotificationKind::Start));
        assert!(!scheduler.throttle().allow(NotificationKind::Absence));
    }

    #[tokio::test]
    async fn test_concurrent_syncs_leave_consistent_state() {
        let source = Arc::new(FakeSource::with_events(vec![
            event("a", at(9, 0), at(10, 0)),
            event("b", at(11, 0), at(12, 0)),
        ]));
        let scheduler = Arc::new(scheduler(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.sync_at(at(10, 30)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(source.calls(), 8);
        let snapshot = scheduler.snapshot().await;
        assert_eq!(snapshot.intervals.len(), 2);
        assert_eq!(snapshot.upcoming.unwrap().summary, "b");
    }
}
