#![warn(missing_docs)]
//! # timeit
//!
//! Time every call of a function, optionally repeating it across threads,
//! worker processes or cooperative tasks.
//!
//! - **Same calling convention**: a decorated function keeps its signature
//!   and returns what it would have returned
//! - **Concurrency substrates**: sequential, rayon thread pool, re-executed
//!   worker processes, or admission-gated futures
//! - **Timeouts**: observed (warn, keep the result) or enforced (cancel, via
//!   `tokio` timers for async code and [`checkpoint`] for blocking code)
//! - **Statistics**: mean, median, min, max, sample std-dev and total over
//!   every run that was not cancelled
//! - **Reporting**: structured `tracing` events, or any [`Reporter`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use timeit::prelude::*;
//!
//! #[timeit_sync(runs = 5, workers = 2)]
//! fn checksum(data: Vec<u8>) -> u32 {
//!     data.iter().map(|&b| b as u32).sum()
//! }
//!
//! let sum = checksum(vec![1, 2, 3]); // logs "checksum: Avg: ..., Med: ..."
//! ```
//!
//! ## Async Functions
//!
//! ```ignore
//! #[timeit_async(runs = 3, workers = 3, timeout = "200ms", enforce_timeout = true)]
//! async fn fetch(id: u32) -> String {
//!     client.get(id).await
//! }
//! ```
//!
//! ## Without Macros
//!
//! ```ignore
//! let timeit = Timeit::new(TimeitConfig::new().runs(10).workers(4))?;
//! let aggregate = timeit.wrap("parse", |s: &str| s.parse::<u64>()).measure("42")?;
//! println!("{:?}", aggregate.statistics);
//! ```
//!
//! ## Worker Processes
//!
//! Closures cannot cross a process boundary. Register the function instead,
//! and let `main` serve as a worker when re-executed:
//!
//! ```ignore
//! fn fib(n: u64) -> u64 { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } }
//!
//! timeit::process_fn! {
//!     static FIB: fn(u64) -> u64 = fib;
//! }
//!
//! fn main() {
//!     timeit::process::run_worker_if_requested();
//!     let config = TimeitConfig::new().runs(4).workers(4).substrate(Substrate::Processes);
//!     let value = Timeit::new(config).unwrap().wrap_process(&FIB).call(30).unwrap();
//! }
//! ```

// Re-export core types
pub use timeit_core::{
    Aggregate, Cancelled, Clock, ConfigError, LogLevel, MonotonicClock, Outcome, RunError,
    RunErrorKind, SteppedClock, Substrate, SupervisorError, TimedAsyncFn, TimedFn,
    TimedProcessFn, Timeit, TimeitConfig, TimeitError, TimeoutPolicy, TimingSample, checkpoint,
    in_timed_run, is_cancelled, process, process_fn, remaining,
};

// Re-export macros
pub use timeit_macros::{timeit, timeit_async, timeit_sync};

// Re-export reporting
pub use timeit_report::{
    MemoryReporter, OutputFormat, RecordedEvent, ReportEvent, Reporter, RunSummary,
    TracingReporter, init_tracing,
};

// Re-export stats
pub use timeit_stats::{SummaryStatistics, compute_summary};

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use timeit_core::internal::*;
}

#[doc(hidden)]
pub mod __private {
    pub use timeit_core::__private::inventory;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Substrate, Timeit, TimeitConfig, TimeitError, checkpoint, is_cancelled, timeit_async,
        timeit_sync,
    };
}

/// Run the timeit CLI harness.
///
/// Call this from a binary's `main()` to time registered functions from the
/// command line:
/// ```ignore
/// fn main() {
///     timeit::run().unwrap();
/// }
/// ```
pub use timeit_cli::run;
