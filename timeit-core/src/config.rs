//! Per-callable timing configuration

use crate::error::ConfigError;
use crate::timeout::TimeoutPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where the runs of one invocation execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Substrate {
    /// Run back to back on the caller's thread
    None,
    /// A rayon pool sized to the worker count
    #[default]
    Threads,
    /// Re-executed worker processes
    Processes,
    /// Interleaved futures on the caller's task
    Cooperative,
}

impl Substrate {
    /// Lowercase name as accepted by [`FromStr`]
    pub fn as_str(self) -> &'static str {
        match self {
            Substrate::None => "none",
            Substrate::Threads => "threads",
            Substrate::Processes => "processes",
            Substrate::Cooperative => "cooperative",
        }
    }
}

impl fmt::Display for Substrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Substrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "sequential" => Ok(Substrate::None),
            "threads" | "thread" => Ok(Substrate::Threads),
            "processes" | "process" => Ok(Substrate::Processes),
            "cooperative" | "async" => Ok(Substrate::Cooperative),
            other => Err(format!("unknown substrate: {other}")),
        }
    }
}

/// Severity of the summary and detailed report lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose
    Trace,
    /// Diagnostic detail
    Debug,
    /// Default
    #[default]
    Info,
    /// Summaries only stand out as warnings
    Warn,
    /// Least verbose
    Error,
}

impl LogLevel {
    /// Matching `tracing` level
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// How a callable is timed
///
/// All fields are public so the attribute macros can build a configuration
/// in a `static`; the chainable setters are the convenient form at runtime.
///
/// ```
/// # use timeit_core::{Substrate, TimeitConfig};
/// let config = TimeitConfig::new()
///     .runs(5)
///     .workers(2)
///     .timeout(0.5)
///     .substrate(Substrate::Threads);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_workers(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeitConfig {
    /// Number of repetitions
    pub runs: usize,
    /// Concurrency width
    pub workers: usize,
    /// Per-run deadline in seconds
    pub timeout: Option<f64>,
    /// Cancel runs at the deadline instead of only warning
    pub enforce_timeout: bool,
    /// Execution substrate
    pub substrate: Substrate,
    /// Emit the full table instead of the one-line summary
    pub detailed: bool,
    /// Severity of the summary line
    pub log_level: LogLevel,
}

impl TimeitConfig {
    /// One run, one worker, threads, no timeout
    pub const DEFAULT: Self = Self {
        runs: 1,
        workers: 1,
        timeout: None,
        enforce_timeout: false,
        substrate: Substrate::Threads,
        detailed: false,
        log_level: LogLevel::Info,
    };

    /// Same as [`TimeitConfig::DEFAULT`]
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Set the number of runs
    pub const fn runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    /// Set the worker count
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-run deadline in seconds
    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Cancel runs at the deadline
    pub const fn enforce_timeout(mut self, enforce: bool) -> Self {
        self.enforce_timeout = enforce;
        self
    }

    /// Choose the execution substrate
    pub const fn substrate(mut self, substrate: Substrate) -> Self {
        self.substrate = substrate;
        self
    }

    /// Emit the full table
    pub const fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    /// Severity of the summary line
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Reject option combinations that cannot run.
    ///
    /// Only checks what holds for every calling convention; the façade adds
    /// the sync/async specific checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runs < 1 {
            return Err(ConfigError::InvalidRuns(self.runs));
        }
        if self.workers < 1 {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        if let Some(timeout) = self.timeout {
            // Sub-nanosecond deadlines round to zero and would disable the policy
            let representable =
                Duration::try_from_secs_f64(timeout).is_ok_and(|d| !d.is_zero());
            if !(timeout.is_finite() && timeout > 0.0 && representable) {
                return Err(ConfigError::InvalidTimeout(timeout));
            }
        }
        if self.enforce_timeout && self.substrate == Substrate::Processes {
            return Err(ConfigError::EnforcedTimeoutWithProcesses);
        }
        if self.substrate == Substrate::Processes && !cfg!(unix) {
            return Err(ConfigError::ProcessesUnsupported);
        }
        Ok(())
    }

    /// Never more workers than runs
    pub fn effective_workers(&self) -> usize {
        self.workers.min(self.runs).max(1)
    }

    /// Deadline as a [`Duration`], when one is set and representable
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|d| !d.is_zero())
    }

    /// Timeout handling derived from `timeout` and `enforce_timeout`
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        match self.timeout_duration() {
            None => TimeoutPolicy::Unbounded,
            Some(deadline) if self.enforce_timeout => TimeoutPolicy::Enforce(deadline),
            Some(deadline) => TimeoutPolicy::Observe(deadline),
        }
    }
}

impl Default for TimeitConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TimeitConfig::default();
        assert_eq!(config.runs, 1);
        assert_eq!(config.workers, 1);
        assert_eq!(config.substrate, Substrate::Threads);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_policy(), TimeoutPolicy::Unbounded);
    }

    #[test]
    fn test_rejects_zero_runs_and_workers() {
        assert_eq!(
            TimeitConfig::new().runs(0).validate(),
            Err(ConfigError::InvalidRuns(0))
        );
        assert_eq!(
            TimeitConfig::new().workers(0).validate(),
            Err(ConfigError::InvalidWorkers(0))
        );
    }

    #[test]
    fn test_rejects_bad_timeouts() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-10, 1e30] {
            assert!(matches!(
                TimeitConfig::new().timeout(bad).validate(),
                Err(ConfigError::InvalidTimeout(_))
            ));
        }
    }

    #[test]
    fn test_smallest_valid_timeout_is_enforced() {
        let config = TimeitConfig::new().timeout(1e-9).enforce_timeout(true);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.timeout_policy(),
            TimeoutPolicy::Enforce(Duration::from_nanos(1))
        );
    }

    #[test]
    fn test_rejects_enforced_timeout_with_processes() {
        let config = TimeitConfig::new()
            .timeout(1.0)
            .enforce_timeout(true)
            .substrate(Substrate::Processes);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EnforcedTimeoutWithProcesses)
        );
    }

    #[test]
    fn test_workers_clamped_to_runs() {
        assert_eq!(TimeitConfig::new().runs(2).workers(8).effective_workers(), 2);
        assert_eq!(TimeitConfig::new().runs(8).workers(3).effective_workers(), 3);
    }

    #[test]
    fn test_timeout_policy_selection() {
        let observe = TimeitConfig::new().timeout(0.25);
        assert_eq!(
            observe.timeout_policy(),
            TimeoutPolicy::Observe(Duration::from_millis(250))
        );
        let enforce = observe.enforce_timeout(true);
        assert_eq!(
            enforce.timeout_policy(),
            TimeoutPolicy::Enforce(Duration::from_millis(250))
        );
        // Enforcement without a deadline has nothing to enforce
        assert_eq!(
            TimeitConfig::new().enforce_timeout(true).timeout_policy(),
            TimeoutPolicy::Unbounded
        );
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Processes".parse::<Substrate>(), Ok(Substrate::Processes));
        assert_eq!("async".parse::<Substrate>(), Ok(Substrate::Cooperative));
        assert!("fibers".parse::<Substrate>().is_err());
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::Debug.as_tracing(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_serde_kebab_case() {
        let config: TimeitConfig = serde_json::from_str(
            r#"{"runs": 4, "substrate": "cooperative", "log_level": "warn"}"#,
        )
        .unwrap();
        assert_eq!(config.runs, 4);
        assert_eq!(config.workers, 1);
        assert_eq!(config.substrate, Substrate::Cooperative);
        assert_eq!(config.log_level, LogLevel::Warn);
    }
}
