//! Merge a day's intervals into a disjoint, start-ordered list.

use shared_types::Interval;

/// Sort `intervals` by start and fold overlapping ones together.
///
/// Each candidate is compared only with the last merged interval:
/// it either extends it (ends inside or right at its end), is swallowed
/// by it (ends no later), or starts a new disjoint interval. The sort is
/// stable, so equal starts keep source order.
pub fn consolidate(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|interval| interval.start);

    tracing::debug!(
        "Intervals sorted by start ({}): {}",
        intervals.len(),
        numbered(&intervals)
    );

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for current in intervals {
        let Some(last) = merged.last_mut() else {
            merged.push(current);
            continue;
        };

        if last.partially_overlaps(&current) {
            *last = last.merged_with(&current);
        } else if last.completely_overlaps(&current) {
            // engulfed
            continue;
        } else {
            merged.push(current);
        }
    }

    merged
}

/// `1) first, 2) second, ...` for log lines.
pub fn numbered(intervals: &[Interval]) -> String {
    intervals
        .iter()
        .enumerate()
        .map(|(idx, interval)| format!("{}) {}", idx + 1, interval.summary))
        .collect::<Vec<_>>()
        .join(", ")
}
