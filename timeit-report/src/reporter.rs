//! Reporter implementations

use crate::event::ReportEvent;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Environment variable read for the default log filter
pub const LOG_ENV: &str = "TIMEIT_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "info,timeit=trace";

/// Sink for report events.
///
/// Implementations must tolerate concurrent calls: runs on different threads
/// report their own timeouts and failures.
pub trait Reporter: Send + Sync {
    /// Deliver one event at the given severity
    fn emit(&self, level: Level, event: &ReportEvent<'_>);
}

/// Forwards events to `tracing` under the `timeit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn emit(&self, level: Level, event: &ReportEvent<'_>) {
        let function = event.function();
        match level {
            Level::ERROR => tracing::error!(target: "timeit", function, "{event}"),
            Level::WARN => tracing::warn!(target: "timeit", function, "{event}"),
            Level::INFO => tracing::info!(target: "timeit", function, "{event}"),
            Level::DEBUG => tracing::debug!(target: "timeit", function, "{event}"),
            _ => tracing::trace!(target: "timeit", function, "{event}"),
        }
    }
}

/// Install a fmt subscriber unless one is already set.
///
/// The filter comes from [`LOG_ENV`], falling back to [`DEFAULT_LOG_FILTER`].
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Fails only when the host application already installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

static DEFAULT_REPORTER: OnceLock<Arc<dyn Reporter>> = OnceLock::new();

/// Process-wide reporter used when none is injected.
///
/// The first call installs logging via [`init_tracing`].
pub fn default_reporter() -> Arc<dyn Reporter> {
    DEFAULT_REPORTER
        .get_or_init(|| {
            init_tracing();
            Arc::new(TracingReporter)
        })
        .clone()
}

/// An event captured by [`MemoryReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Severity it was emitted at
    pub level: Level,
    /// Function the event concerns
    pub function: String,
    /// Rendered line
    pub message: String,
}

/// Keeps every event in memory; intended for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in emission order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    /// Recorded events at exactly `level`
    pub fn at_level(&self, level: Level) -> Vec<RecordedEvent> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Number of recorded events whose message contains `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.message.contains(needle))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        // A panicking reporter caller must not hide earlier events
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, level: Level, event: &ReportEvent<'_>) {
        self.lock().push(RecordedEvent {
            level,
            function: event.function().to_string(),
            message: event.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_memory_reporter_records_in_order() {
        let reporter = MemoryReporter::new();
        reporter.emit(
            Level::WARN,
            &ReportEvent::TimeoutObserved {
                name: "a",
                index: 0,
                elapsed: Duration::from_millis(20),
                timeout: Duration::from_millis(10),
            },
        );
        reporter.emit(
            Level::ERROR,
            &ReportEvent::RunFailed {
                name: "a",
                index: 1,
                message: "boom",
            },
        );

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[1].message, "a: execution 1 failed with: boom");
        assert_eq!(reporter.at_level(Level::ERROR).len(), 1);
        assert_eq!(reporter.count_containing("exceeded timeout"), 1);
    }

    #[test]
    fn test_default_reporter_is_shared() {
        let first = default_reporter();
        let second = default_reporter();
        assert!(Arc::ptr_eq(&first, &second));
        // Must not panic even though a subscriber is now installed
        init_tracing();
        first.emit(
            Level::INFO,
            &ReportEvent::AllCancelled { name: "t", runs: 1 },
        );
    }
}
