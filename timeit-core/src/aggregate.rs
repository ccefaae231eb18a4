//! Aggregation of samples into one result

use crate::error::{RunError, TimeitError};
use crate::sample::{Outcome, TimingSample};
use timeit_report::RunSummary;
use timeit_stats::{SummaryStatistics, compute_summary};

/// Result of one timed call.
///
/// The counters overlap: a run that panicked after an observed deadline is
/// both `timed_out` and `failed`, and one that panicked after an enforced
/// deadline is both `cancelled` and `failed`.
#[derive(Debug)]
pub struct Aggregate<R> {
    /// Name of the timed function
    pub name: String,
    /// `Debug` rendering of the arguments
    pub args: String,
    /// Requested runs
    pub runs: usize,
    /// Effective workers
    pub workers: usize,
    /// Samples received, cancelled ones included
    pub sample_count: usize,
    /// Runs that returned within their deadline
    pub completed: usize,
    /// Runs that finished after an observed deadline
    pub timed_out: usize,
    /// Runs cancelled at an enforced deadline
    pub cancelled: usize,
    /// Runs that failed
    pub failed: usize,
    /// Statistics over non-cancelled runs
    pub statistics: Option<SummaryStatistics>,
    /// Every captured failure in submission order, cancelled runs included
    pub errors: Vec<RunError>,
    /// Value handed back to the caller
    pub representative: Result<R, TimeitError>,
}

impl<R> Aggregate<R> {
    /// Reduce samples, which must already be in submission order.
    ///
    /// The representative value is the one from the last non-cancelled run
    /// that produced one. Without such a run it is the last non-cancelled
    /// failure, or [`TimeitError::AllCancelled`].
    pub fn from_samples(
        name: &str,
        args: String,
        runs: usize,
        workers: usize,
        samples: Vec<TimingSample<R>>,
    ) -> Self {
        let sample_count = samples.len();
        let mut durations = Vec::with_capacity(sample_count);
        let mut errors = Vec::new();
        let mut last_value = None;
        let mut last_error = None;
        let (mut completed, mut timed_out, mut cancelled) = (0, 0, 0);

        for sample in samples {
            match sample.outcome {
                Outcome::TimedOutAndCancelled => {
                    cancelled += 1;
                    // Reported, but never representative
                    errors.extend(sample.error);
                    continue;
                }
                Outcome::TimedOutButFinished => timed_out += 1,
                Outcome::Completed if sample.error.is_none() => completed += 1,
                Outcome::Completed => {}
            }

            durations.push(sample.elapsed.as_secs_f64());
            if let Some(value) = sample.value {
                last_value = Some(value);
            }
            if let Some(error) = sample.error {
                errors.push(error.clone());
                last_error = Some(error);
            }
        }

        let statistics = (!durations.is_empty()).then(|| compute_summary(&durations));
        let representative = match (last_value, last_error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(TimeitError::RunFailed {
                name: name.to_string(),
                error,
            }),
            (None, None) => Err(TimeitError::AllCancelled {
                name: name.to_string(),
                runs: sample_count,
            }),
        };

        Self {
            name: name.to_string(),
            args,
            runs,
            workers,
            sample_count,
            completed,
            timed_out,
            cancelled,
            failed: errors.len(),
            statistics,
            errors,
            representative,
        }
    }

    /// Whether every run was cancelled
    pub fn all_cancelled(&self) -> bool {
        self.sample_count > 0 && self.cancelled == self.sample_count
    }

    /// What the reporter sees
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            name: self.name.clone(),
            args: self.args.clone(),
            runs: self.runs,
            workers: self.workers,
            completed: self.completed,
            timed_out: self.timed_out,
            cancelled: self.cancelled,
            failed: self.failed,
            statistics: self.statistics,
        }
    }

    /// The representative value
    pub fn into_result(self) -> Result<R, TimeitError> {
        self.representative
    }
}
