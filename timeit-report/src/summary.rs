//! Per-call summary handed to reporters

use serde::{Deserialize, Serialize};
use timeit_stats::SummaryStatistics;

/// What happened during one timed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Name of the timed function
    pub name: String,
    /// `Debug` rendering of the arguments
    pub args: String,
    /// Requested number of runs
    pub runs: usize,
    /// Effective worker count
    pub workers: usize,
    /// Runs that finished within their deadline
    pub completed: usize,
    /// Runs that finished after their deadline
    pub timed_out: usize,
    /// Runs abandoned at an enforced deadline
    pub cancelled: usize,
    /// Runs that panicked or never reported back
    pub failed: usize,
    /// Statistics over non-cancelled runs, absent when every run was cancelled
    pub statistics: Option<SummaryStatistics>,
}

impl RunSummary {
    /// Statistics, or all zeros when none were computed
    pub fn statistics_or_default(&self) -> SummaryStatistics {
        self.statistics.unwrap_or_default()
    }

    /// Whether any run went past its deadline, cancelled or not
    pub fn any_timed_out(&self) -> bool {
        self.timed_out > 0 || self.cancelled > 0
    }
}
