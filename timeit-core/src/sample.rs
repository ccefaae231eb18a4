//! Timing samples

use crate::error::RunError;
use std::time::Duration;

/// How a run ended relative to its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished within the deadline, or no deadline was set
    Completed,
    /// Finished after an observed deadline; still counted
    TimedOutButFinished,
    /// Abandoned at an enforced deadline; excluded from statistics
    TimedOutAndCancelled,
}

impl Outcome {
    /// Whether the run was cancelled
    pub fn is_cancelled(self) -> bool {
        self == Outcome::TimedOutAndCancelled
    }

    /// Whether the run went past its deadline
    pub fn is_timed_out(self) -> bool {
        self != Outcome::Completed
    }
}

/// One run's measurement
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSample<T> {
    /// Submission index
    pub index: usize,
    /// Wall-clock time around the call (the deadline, for cancelled runs)
    pub elapsed: Duration,
    /// Deadline outcome
    pub outcome: Outcome,
    /// Return value, absent when cancelled or failed
    pub value: Option<T>,
    /// Captured failure
    pub error: Option<RunError>,
}

impl<T> TimingSample<T> {
    /// A run that returned `value`
    pub fn completed(index: usize, elapsed: Duration, value: T) -> Self {
        Self {
            index,
            elapsed,
            outcome: Outcome::Completed,
            value: Some(value),
            error: None,
        }
    }

    /// A run that failed; the outcome stays `Completed`
    pub fn failed(index: usize, elapsed: Duration, error: RunError) -> Self {
        Self {
            index,
            elapsed,
            outcome: Outcome::Completed,
            value: None,
            error: Some(error),
        }
    }

    /// A run abandoned at its deadline
    pub fn cancelled(index: usize, deadline: Duration) -> Self {
        Self {
            index,
            elapsed: deadline,
            outcome: Outcome::TimedOutAndCancelled,
            value: None,
            error: None,
        }
    }

    /// Turn a finished run into one abandoned at `deadline`.
    ///
    /// The value is discarded; a captured failure is kept.
    pub fn cancel(self, deadline: Duration) -> Self {
        Self {
            index: self.index,
            elapsed: deadline,
            outcome: Outcome::TimedOutAndCancelled,
            value: None,
            error: self.error,
        }
    }

    /// Transform the value, keeping the measurement
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TimingSample<U> {
        TimingSample {
            index: self.index,
            elapsed: self.elapsed,
            outcome: self.outcome,
            value: self.value.map(f),
            error: self.error,
        }
    }

    /// Whether the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.outcome.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunErrorKind;

    #[test]
    fn test_constructors() {
        let ok = TimingSample::completed(0, Duration::from_millis(5), 42);
        assert_eq!(ok.value, Some(42));
        assert!(!ok.outcome.is_timed_out());

        let failed: TimingSample<i32> = TimingSample::failed(
            1,
            Duration::from_millis(1),
            RunError::new(1, RunErrorKind::Panic, "x"),
        );
        assert_eq!(failed.outcome, Outcome::Completed);
        assert!(failed.value.is_none());

        let cancelled: TimingSample<i32> = TimingSample::cancelled(2, Duration::from_secs(1));
        assert!(cancelled.is_cancelled());
        assert!(cancelled.outcome.is_timed_out());
        assert_eq!(cancelled.elapsed, Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_keeps_failure() {
        let late: TimingSample<i32> = TimingSample::failed(
            5,
            Duration::from_millis(40),
            RunError::new(5, RunErrorKind::Panic, "gave up"),
        );
        let cancelled = late.cancel(Duration::from_millis(10));
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.index, 5);
        assert_eq!(cancelled.elapsed, Duration::from_millis(10));
        assert_eq!(cancelled.error.unwrap().message, "gave up");

        let value = TimingSample::completed(0, Duration::from_millis(40), 1);
        assert_eq!(value.cancel(Duration::from_millis(10)).value, None);
    }

    #[test]
    fn test_map_keeps_measurement() {
        let sample = TimingSample::completed(4, Duration::from_millis(3), 2).map(|v| v * 10);
        assert_eq!(sample.index, 4);
        assert_eq!(sample.value, Some(20));
        assert_eq!(sample.elapsed, Duration::from_millis(3));
    }
}
