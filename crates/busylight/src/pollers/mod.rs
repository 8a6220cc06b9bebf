//! Background tasks driving the light from the schedule.

pub mod calendar;

pub use calendar::{CalendarWatcher, TickOutcome, WatcherConfig};
