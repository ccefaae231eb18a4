//! Error types

use std::fmt;
use thiserror::Error;

/// Invalid option combination, raised before any run starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("runs must be at least 1, got {0}")]
    InvalidRuns(usize),

    #[error("workers must be at least 1, got {0}")]
    InvalidWorkers(usize),

    #[error("timeout must be a positive, finite number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("enforce_timeout is not supported with the processes substrate")]
    EnforcedTimeoutWithProcesses,

    #[error("the cooperative substrate can only time async functions")]
    CooperativeRequiresAsync,

    #[error("the processes substrate can only time registered synchronous functions")]
    ProcessesRequireSync,

    #[error("enforced timeouts on async functions need a running tokio runtime")]
    MissingRuntime,

    #[error("the processes substrate is only available on unix")]
    ProcessesUnsupported,
}

/// How a single run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// The callable panicked
    Panic,
    /// Arguments or result could not cross the process boundary
    Serialization,
    /// The worker process died or stopped answering
    WorkerLost,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunErrorKind::Panic => "panicked",
            RunErrorKind::Serialization => "could not be encoded",
            RunErrorKind::WorkerLost => "lost its worker",
        })
    }
}

/// Failure captured into one run's sample
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("run {index} {kind}: {message}")]
pub struct RunError {
    /// Submission index of the run
    pub index: usize,
    /// Failure category
    pub kind: RunErrorKind,
    /// Panic payload or transport error text
    pub message: String,
}

impl RunError {
    /// Shorthand constructor
    pub fn new(index: usize, kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            message: message.into(),
        }
    }
}

/// Errors from the worker-process pool
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] timeit_ipc::FrameError),

    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("worker {pid} does not provide `{target}`")]
    MissingTarget { pid: u32, target: String },

    #[error("worker exited: {0}")]
    WorkerExited(String),

    #[error("worker did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// Aggregate-level failure of a timed call
#[derive(Debug, Error)]
pub enum TimeitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot send `{target}` across the process boundary: {reason}")]
    Serialization { target: String, reason: String },

    #[error("{name}: all {runs} runs were cancelled, no result available")]
    AllCancelled { name: String, runs: usize },

    #[error("{name}: no run produced a value, last failure: {error}")]
    RunFailed { name: String, error: RunError },

    #[error("worker pool failed: {0}")]
    Process(#[from] SupervisorError),

    #[error("failed to build thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl TimeitError {
    /// Re-raise as a panic, the way a decorated function reports failure.
    ///
    /// A failed run resumes with its original panic message.
    pub fn raise(self) -> ! {
        match self {
            TimeitError::RunFailed { error, .. } if error.kind == RunErrorKind::Panic => {
                std::panic::panic_any(error.message)
            }
            other => panic!("{other}"),
        }
    }
}
