//! Concurrency strategies
//!
//! Every strategy turns one request into `runs` samples in submission order.

pub(crate) mod cooperative;
pub(crate) mod sequential;
pub(crate) mod threads;

use crate::config::{Substrate, TimeitConfig};
use crate::error::ConfigError;
use crate::measure::Clock;
use crate::timeout::TimeoutPolicy;
use timeit_report::Reporter;

/// Everything a strategy needs to drive the runs of one call
pub struct Execution<'a> {
    /// Name reported for the timed function
    pub name: &'a str,
    /// Number of runs
    pub runs: usize,
    /// Effective concurrency width
    pub workers: usize,
    /// Deadline handling per run
    pub policy: TimeoutPolicy,
    /// Time source
    pub clock: &'a dyn Clock,
    /// Event sink
    pub reporter: &'a dyn Reporter,
}

/// The strategy chosen for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Direct calls on the caller's thread
    Sequential,
    /// Rayon pool per call
    Threads,
    /// Worker processes
    Processes,
    /// Admission-gated futures on the caller's task
    Cooperative,
}

impl Plan {
    /// Strategy for a synchronous callable.
    ///
    /// A single run never pays for a pool, whatever the substrate.
    pub fn blocking(config: &TimeitConfig) -> Result<Plan, ConfigError> {
        match config.substrate {
            Substrate::Cooperative => Err(ConfigError::CooperativeRequiresAsync),
            _ if config.runs == 1 => Ok(Plan::Sequential),
            Substrate::None => Ok(Plan::Sequential),
            Substrate::Threads if config.effective_workers() == 1 => Ok(Plan::Sequential),
            Substrate::Threads => Ok(Plan::Threads),
            Substrate::Processes => Ok(Plan::Processes),
        }
    }

    /// Strategy for an asynchronous callable; always cooperative
    pub fn suspendable(config: &TimeitConfig) -> Result<Plan, ConfigError> {
        match config.substrate {
            Substrate::Processes => Err(ConfigError::ProcessesRequireSync),
            _ => Ok(Plan::Cooperative),
        }
    }

    /// Worker count this plan actually uses
    pub fn workers(&self, config: &TimeitConfig) -> usize {
        match self {
            Plan::Sequential => 1,
            Plan::Cooperative if config.substrate == Substrate::None => 1,
            _ => config.effective_workers(),
        }
    }
}
