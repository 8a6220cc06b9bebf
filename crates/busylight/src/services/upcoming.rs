//! Pick the interval the watcher should be tracking right now.

use chrono::{DateTime, Utc};
use shared_types::Interval;

/// Index of the first interval that has not finished by `now`, which is
/// either the one in progress or the next one to start.
///
/// `intervals` must be consolidated (start-ordered and disjoint).
pub fn select_upcoming(intervals: &[Interval], now: DateTime<Utc>) -> Option<usize> {
    intervals.iter().position(|interval| now < interval.end)
}
