//! Render timing hooks
//!
//! Timing is reported to an injected observer rather than printed from
//! global state.

use std::time::{Duration, Instant};

use log::debug;

/// Receives start/stop notifications around timed render work
pub trait TimingObserver: Send + Sync {
    fn started(&self, _label: &str) {}

    fn stopped(&self, _label: &str, _elapsed: Duration) {}
}

/// Logs every measurement at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTiming;

impl TimingObserver for LogTiming {
    fn stopped(&self, label: &str, elapsed: Duration) {
        debug!("{label}: {:.3}ms", elapsed.as_secs_f64() * 1e3);
    }
}

/// Discards all measurements
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTiming;

impl TimingObserver for NoTiming {}

/// One measurement in progress
pub struct Stopwatch<'a> {
    observer: &'a dyn TimingObserver,
    label: String,
    started_at: Instant,
}

impl<'a> Stopwatch<'a> {
    pub fn start(observer: &'a dyn TimingObserver, label: impl Into<String>) -> Self {
        let label = label.into();
        observer.started(&label);
        Self {
            observer,
            label,
            started_at: Instant::now(),
        }
    }

    /// Finish the measurement and report it
    pub fn stop(self) -> Duration {
        let elapsed = self.started_at.elapsed();
        self.observer.stopped(&self.label, elapsed);
        elapsed
    }
}
