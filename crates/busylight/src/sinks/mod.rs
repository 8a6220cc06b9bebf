//! Observers notified when a busy interval starts or ends.
//!
//! The watcher never talks to an actuator directly; it goes through
//! [`Observers`], which calls every registered [`IntervalObserver`] in
//! registration order. A failing observer is logged and skipped so the
//! others still hear about the transition.

mod light;

pub use light::LightSink;

use async_trait::async_trait;
use shared_types::Interval;
use std::sync::Arc;

#[async_trait]
pub trait IntervalObserver: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    async fn on_interval_start(&self, interval: &Interval) -> anyhow::Result<()>;

    /// `interval` is `None` when nothing is in progress rather than a
    /// specific interval having just finished.
    async fn on_interval_end(&self, interval: Option<&Interval>) -> anyhow::Result<()>;
}

/// Ordered set of observers.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn IntervalObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn IntervalObserver>) {
        tracing::debug!("Registered interval observer {}", observer.name());
        self.observers.push(observer);
    }

    pub fn with(mut self, observer: Arc<dyn IntervalObserver>) -> Self {
        self.register(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Returns how many observers failed.
    pub async fn interval_started(&self, interval: &Interval) -> usize {
        let mut failures = 0;
        for observer in &self.observers {
            if let Err(e) = observer.on_interval_start(interval).await {
                tracing::error!(
                    "Observer {} failed on start of {:?}: {:#}",
                    observer.name(),
                    interval.summary,
                    e
                );
                failures += 1;
            }
        }
        failures
    }

    /// Returns how many observers failed.
    pub async fn interval_ended(&self, interval: Option<&Interval>) -> usize {
        let mut failures = 0;
        for observer in &self.observers {
            if let Err(e) = observer.on_interval_end(interval).await {
                tracing::error!(
                    "Observer {} failed on end of {:?}: {:#}",
                    observer.name(),
                    interval.map(|i| i.summary.as_str()),
                    e
                );
                failures += 1;
            }
        }
        failures
    }
}

/// Writes every transition to the log.
pub struct LoggingObserver;

#[async_trait]
impl IntervalObserver for LoggingObserver {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_interval_start(&self, interval: &Interval) -> anyhow::Result<()> {
        tracing::info!(
            "Busy: {:?} ({} - {})",
            interval.summary,
            interval.start,
            interval.end
        );
        Ok(())
    }

    async fn on_interval_end(&self, interval: Option<&Interval>) -> anyhow::Result<()> {
        match interval {
            Some(interval) => tracing::info!("Free: {:?} ended at {}", interval.summary, interval.end),
            None => tracing::info!("Free: nothing in progress"),
        }
        Ok(())
    }
}
