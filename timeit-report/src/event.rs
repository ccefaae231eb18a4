//! Report events and their rendered lines

use crate::summary::RunSummary;
use crate::table::render_table;
use std::fmt;
use std::time::Duration;

/// A single thing the timing engine reports
#[derive(Debug, Clone, Copy)]
pub enum ReportEvent<'a> {
    /// One-line summary of a finished call
    Summary(&'a RunSummary),
    /// Full table for a finished call
    Detailed(&'a RunSummary),
    /// A run finished after its deadline and was kept
    TimeoutObserved {
        /// Timed function
        name: &'a str,
        /// Submission index of the run
        index: usize,
        /// Measured duration
        elapsed: Duration,
        /// Configured deadline
        timeout: Duration,
    },
    /// A run hit its enforced deadline and was dropped
    TimeoutCancelled {
        /// Timed function
        name: &'a str,
        /// Submission index of the run
        index: usize,
        /// Configured deadline
        timeout: Duration,
    },
    /// A run panicked or its worker died
    RunFailed {
        /// Timed function
        name: &'a str,
        /// Submission index of the run
        index: usize,
        /// Failure message
        message: &'a str,
    },
    /// Every run was cancelled
    AllCancelled {
        /// Timed function
        name: &'a str,
        /// Number of runs attempted
        runs: usize,
    },
    /// A deprecated entry point was used
    Deprecated {
        /// Timed function
        name: &'a str,
        /// What to use instead
        message: &'a str,
    },
}

impl ReportEvent<'_> {
    /// Name of the function the event concerns
    pub fn function(&self) -> &str {
        match self {
            ReportEvent::Summary(summary) | ReportEvent::Detailed(summary) => &summary.name,
            ReportEvent::TimeoutObserved { name, .. }
            | ReportEvent::TimeoutCancelled { name, .. }
            | ReportEvent::RunFailed { name, .. }
            | ReportEvent::AllCancelled { name, .. }
            | ReportEvent::Deprecated { name, .. } => name,
        }
    }
}

impl fmt::Display for ReportEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportEvent::Summary(summary) => {
                let stats = summary.statistics_or_default();
                if summary.runs == 1 {
                    write!(f, "{}: Exec: {:.6}s", summary.name, stats.mean)
                } else {
                    write!(
                        f,
                        "{}: Avg: {:.3}s, Med: {:.3}s",
                        summary.name, stats.mean, stats.median
                    )
                }
            }
            ReportEvent::Detailed(summary) => f.write_str(&render_table(summary)),
            ReportEvent::TimeoutObserved {
                name,
                index,
                elapsed,
                timeout,
            } => write!(
                f,
                "{name} run {index} exceeded timeout of {}s but continued running ({:.6}s)",
                timeout.as_secs_f64(),
                elapsed.as_secs_f64()
            ),
            ReportEvent::TimeoutCancelled {
                name,
                index,
                timeout,
            } => write!(
                f,
                "{name} run {index} exceeded enforced timeout of {}s and was cancelled",
                timeout.as_secs_f64()
            ),
            ReportEvent::RunFailed {
                name,
                index,
                message,
            } => write!(f, "{name}: execution {index} failed with: {message}"),
            ReportEvent::AllCancelled { name, runs } => {
                write!(f, "{name}: all {runs} executions were cancelled")
            }
            ReportEvent::Deprecated { name, message } => {
                write!(f, "{name}: deprecated: {message}")
            }
        }
    }
}
