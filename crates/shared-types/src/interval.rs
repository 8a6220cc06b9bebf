//! Busy intervals and the time predicates the scheduler is built on.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SourceEvent;

/// A single busy span, either taken straight from one calendar entry or
/// synthesised by merging several overlapping ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_recurring: bool,
}

/// Where "now" sits relative to an interval. The three phases partition
/// the time line; both endpoints count as in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    YetToStart,
    InProgress,
    Ended,
}

/// Reasons a source record cannot become an [`Interval`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("event {0:?} has no usable start time")]
    MissingStart(String),

    #[error("event {0:?} has no usable end time")]
    MissingEnd(String),

    #[error("event {summary:?} ends ({end}) before it starts ({start})")]
    EndBeforeStart {
        summary: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Recurring instances only carry a corrected start date; an end on a
    /// different local day cannot be placed reliably.
    #[error("recurring event {0:?} does not start and end on the same local day")]
    CrossesMidnight(String),

    #[error("event {0:?} starts at a local time that does not exist today")]
    NonexistentLocalTime(String),
}

impl Interval {
    pub fn new(
        summary: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            start,
            end,
            is_recurring: false,
        }
    }

    /// Build an interval from a source record, as seen from `now`.
    ///
    /// Recurring records get their start moved onto `now`'s local date,
    /// keeping the local time of day. Their end is not moved, so a
    /// recurring record must start and end on that same local date or it
    /// is rejected.
    pub fn from_source<Z: TimeZone>(
        event: &SourceEvent,
        now: &DateTime<Z>,
    ) -> Result<Self, IntervalError> {
        let mut start = event
            .start
            .ok_or_else(|| IntervalError::MissingStart(event.summary.clone()))?;
        let end = event
            .end
            .ok_or_else(|| IntervalError::MissingEnd(event.summary.clone()))?;

        if event.recurring {
            let tz = now.timezone();
            let today = now.date_naive();
            start = move_to_date(&start, today, &tz)
                .ok_or_else(|| IntervalError::NonexistentLocalTime(event.summary.clone()))?;
            if end.with_timezone(&tz).date_naive() != today {
                return Err(IntervalError::CrossesMidnight(event.summary.clone()));
            }
        }

        if end < start {
            return Err(IntervalError::EndBeforeStart {
                summary: event.summary.clone(),
                start,
                end,
            });
        }

        Ok(Self {
            summary: event.summary.clone(),
            description: event.description.clone(),
            start,
            end,
            is_recurring: event.recurring,
        })
    }

    /// True when `self` ends inside `[other.start, other.end)`.
    ///
    /// Only meaningful when `other` does not start before `self`, which is
    /// how the consolidator calls it.
    pub fn partially_overlaps(&self, other: &Interval) -> bool {
        self.end >= other.start && self.end < other.end
    }

    /// True when `self` reaches at least as far as `other` does.
    pub fn completely_overlaps(&self, other: &Interval) -> bool {
        self.end >= other.end
    }

    pub fn in_progress(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now <= self.end
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }

    pub fn is_yet_to_start(&self, now: DateTime<Utc>) -> bool {
        now < self.start
    }

    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        if self.is_yet_to_start(now) {
            Phase::YetToStart
        } else if self.has_ended(now) {
            Phase::Ended
        } else {
            Phase::InProgress
        }
    }

    /// Extend `self` up to `next.end`, joining the text fields so the
    /// merged interval still names every entry it absorbed.
    pub fn merged_with(&self, next: &Interval) -> Interval {
        Interval {
            summary: format!("{}:{}", self.summary, next.summary),
            description: format!("{}:{}", self.description, next.description),
            start: self.start,
            end: next.end,
            is_recurring: false,
        }
    }
}

fn move_to_date<Z: TimeZone>(
    instant: &DateTime<Utc>,
    date: NaiveDate,
    tz: &Z,
) -> Option<DateTime<Utc>> {
    let local_time = instant.with_timezone(tz).time();
    tz.from_local_datetime(&date.and_time(local_time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
