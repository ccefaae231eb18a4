//! Timeout policy
//!
//! Wraps one runner invocation with the configured deadline and classifies
//! the resulting sample. Observed deadlines only flag late runs; enforced
//! ones turn them into cancelled samples.

use crate::runner;
use crate::sample::{Outcome, TimingSample};
use crate::strategy::Execution;
use std::future::Future;
use std::time::{Duration, Instant};
use timeit_report::ReportEvent;
use tracing::Level;

/// Deadline handling for each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// No deadline
    #[default]
    Unbounded,
    /// Warn about runs longer than the deadline, keep their results
    Observe(Duration),
    /// Cancel runs at the deadline
    Enforce(Duration),
}

impl TimeoutPolicy {
    /// The deadline, if any
    pub fn deadline(&self) -> Option<Duration> {
        match *self {
            TimeoutPolicy::Unbounded => None,
            TimeoutPolicy::Observe(t) | TimeoutPolicy::Enforce(t) => Some(t),
        }
    }

    /// Whether runs are cancelled at the deadline
    pub fn is_enforced(&self) -> bool {
        matches!(self, TimeoutPolicy::Enforce(_))
    }

    /// Run a blocking invocation on the current thread.
    ///
    /// An enforced deadline is published to the callable through
    /// [`checkpoint`](crate::checkpoint); the run is classified once it
    /// returns.
    pub fn run_blocking<R>(
        &self,
        index: usize,
        exec: &Execution<'_>,
        f: impl FnOnce() -> R,
    ) -> TimingSample<R> {
        let deadline = match *self {
            TimeoutPolicy::Enforce(t) => Instant::now().checked_add(t),
            _ => None,
        };
        let sample = runner::run_blocking(index, exec.clock, deadline, f);
        if let (TimeoutPolicy::Enforce(t), Some(deadline)) = (*self, deadline) {
            // The clock may be synthetic; the published deadline is authoritative
            if Instant::now() >= deadline {
                report_cancelled(exec, index, t);
                return sample.cancel(t);
            }
        }
        self.settle(sample, exec)
    }

    /// Await a unit of work, racing it against an enforced deadline.
    ///
    /// On expiry the unit is dropped and the sample recorded at the deadline.
    pub async fn run_suspendable<Fut: Future>(
        &self,
        index: usize,
        exec: &Execution<'_>,
        fut: Fut,
    ) -> TimingSample<Fut::Output> {
        match *self {
            TimeoutPolicy::Enforce(t) => {
                let deadline = Instant::now().checked_add(t);
                let unit = runner::run_suspendable(index, exec.clock, deadline, fut);
                match tokio::time::timeout(t, unit).await {
                    Ok(sample) => self.settle(sample, exec),
                    Err(_) => {
                        report_cancelled(exec, index, t);
                        TimingSample::cancelled(index, t)
                    }
                }
            }
            _ => {
                let sample = runner::run_suspendable(index, exec.clock, None, fut).await;
                self.settle(sample, exec)
            }
        }
    }

    /// Classify a finished run against the deadline, reporting late runs
    pub fn settle<R>(&self, mut sample: TimingSample<R>, exec: &Execution<'_>) -> TimingSample<R> {
        match *self {
            TimeoutPolicy::Unbounded => sample,
            TimeoutPolicy::Observe(t) => {
                if sample.elapsed > t {
                    sample.outcome = Outcome::TimedOutButFinished;
                    exec.reporter.emit(
                        Level::WARN,
                        &ReportEvent::TimeoutObserved {
                            name: exec.name,
                            index: sample.index,
                            elapsed: sample.elapsed,
                            timeout: t,
                        },
                    );
                }
                sample
            }
            TimeoutPolicy::Enforce(t) => {
                if sample.elapsed > t {
                    report_cancelled(exec, sample.index, t);
                    sample.cancel(t)
                } else {
                    sample
                }
            }
        }
    }
}

fn report_cancelled(exec: &Execution<'_>, index: usize, timeout: Duration) {
    exec.reporter.emit(
        Level::WARN,
        &ReportEvent::TimeoutCancelled {
            name: exec.name,
            index,
            timeout,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{MonotonicClock, SteppedClock};
    use crate::sample::Outcome;
    use timeit_report::MemoryReporter;

    fn exec<'a>(
        clock: &'a dyn crate::measure::Clock,
        reporter: &'a MemoryReporter,
        policy: TimeoutPolicy,
    ) -> Execution<'a> {
        Execution {
            name: "job",
            runs: 1,
            workers: 1,
            policy,
            clock,
            reporter,
        }
    }

    #[test]
    fn test_observe_keeps_late_result() {
        let clock = SteppedClock::new(Duration::from_millis(50));
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Observe(Duration::from_millis(10));
        let exec = exec(&clock, &reporter, policy);

        let sample = policy.run_blocking(0, &exec, || "late");

        assert_eq!(sample.outcome, Outcome::TimedOutButFinished);
        assert_eq!(sample.value, Some("late"));
        assert_eq!(sample.elapsed, Duration::from_millis(50));
        assert_eq!(reporter.at_level(Level::WARN).len(), 1);
    }

    #[test]
    fn test_observe_on_time_is_silent() {
        let clock = SteppedClock::new(Duration::from_millis(5));
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Observe(Duration::from_millis(10));
        let sample = policy.run_blocking(0, &exec(&clock, &reporter, policy), || 1);

        assert_eq!(sample.outcome, Outcome::Completed);
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn test_enforce_discards_late_value() {
        let clock = SteppedClock::new(Duration::from_millis(50));
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Enforce(Duration::from_millis(10));
        let sample = policy.run_blocking(3, &exec(&clock, &reporter, policy), || 99);

        assert_eq!(sample.outcome, Outcome::TimedOutAndCancelled);
        assert_eq!(sample.value, None);
        assert_eq!(sample.index, 3);
        assert_eq!(sample.elapsed, Duration::from_millis(10));
        assert_eq!(reporter.count_containing("was cancelled"), 1);
    }

    #[test]
    fn test_enforce_publishes_deadline_to_checkpoints() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Enforce(Duration::from_millis(20));
        let sample = policy.run_blocking(0, &exec(&clock, &reporter, policy), || {
            let mut polls = 0u32;
            while crate::checkpoint().is_ok() {
                polls += 1;
                std::thread::sleep(Duration::from_millis(2));
            }
            polls
        });

        // The loop only ends once the deadline passes
        assert!(sample.is_cancelled());
    }

    #[test]
    fn test_enforce_keeps_failure_past_deadline() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Enforce(Duration::from_millis(10));
        let sample = policy.run_blocking(2, &exec(&clock, &reporter, policy), || -> u8 {
            std::thread::sleep(Duration::from_millis(30));
            crate::checkpoint().expect("gave up");
            1
        });

        assert!(sample.is_cancelled());
        assert_eq!(sample.elapsed, Duration::from_millis(10));
        let error = sample.error.expect("failure kept");
        assert_eq!(error.index, 2);
        assert!(error.message.contains("gave up"));
    }

    #[tokio::test]
    async fn test_enforce_cancels_pending_unit() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Enforce(Duration::from_millis(20));
        let exec = exec(&clock, &reporter, policy);

        let started = Instant::now();
        let sample = policy
            .run_suspendable(0, &exec, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "never"
            })
            .await;

        assert!(sample.is_cancelled());
        assert_eq!(sample.elapsed, Duration::from_millis(20));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(reporter.count_containing("was cancelled"), 1);
    }

    #[tokio::test]
    async fn test_observe_waits_for_slow_unit() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let policy = TimeoutPolicy::Observe(Duration::from_millis(10));
        let sample = policy
            .run_suspendable(0, &exec(&clock, &reporter, policy), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                7
            })
            .await;

        assert_eq!(sample.outcome, Outcome::TimedOutButFinished);
        assert_eq!(sample.value, Some(7));
        assert_eq!(reporter.count_containing("continued running"), 1);
    }
}
