pub mod consolidation;
pub mod scheduler;
pub mod throttle;
pub mod upcoming;

pub use consolidation::consolidate;
pub use scheduler::{ScheduleSnapshot, Scheduler, SchedulerConfig, SyncSummary};
pub use throttle::Throttle;
pub use upcoming::select_upcoming;
