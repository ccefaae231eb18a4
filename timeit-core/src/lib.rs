#![warn(missing_docs)]
//! timeit Core - Execution Engine
//!
//! This crate times repeated calls of one function:
//! - `Timeit` façade wrapping sync, async and registered callables
//! - Sequential, thread-pool, cooperative and worker-process strategies
//! - Observed or enforced per-run deadlines with cooperative checkpoints
//! - Aggregation of samples into statistics and a representative value

mod aggregate;
mod cancel;
mod config;
mod error;
mod facade;
mod measure;
pub mod process;
mod runner;
mod sample;
mod strategy;
mod timeout;

#[doc(hidden)]
pub mod internal;

pub use aggregate::Aggregate;
pub use cancel::{Cancelled, checkpoint, in_timed_run, is_cancelled, remaining};
pub use config::{LogLevel, Substrate, TimeitConfig};
pub use error::{ConfigError, RunError, RunErrorKind, SupervisorError, TimeitError};
pub use facade::{TimedAsyncFn, TimedFn, TimedProcessFn, Timeit};
pub use measure::{Clock, MonotonicClock, SteppedClock, Timer};
pub use runner::{run_blocking, run_suspendable};
pub use sample::{Outcome, TimingSample};
pub use strategy::{Execution, Plan};
pub use timeout::TimeoutPolicy;

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}

/// Anchor to prevent LTO from stripping registered process functions
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<process::ProcessTarget> {}
};
