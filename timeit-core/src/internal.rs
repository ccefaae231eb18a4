//! Support for code generated by the attribute macros.
//!
//! Not a stable interface.

use crate::error::{ConfigError, TimeitError};
use crate::facade::{Timeit, TimedAsyncFn, TimedFn, TimedProcessFn, nested_call};
use crate::process::ProcessFn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Once, OnceLock};
use timeit_report::{ReportEvent, Reporter};
use tracing::Level;

pub use crate::config::{LogLevel, Substrate, TimeitConfig};

const DEPRECATION: &str =
    "#[timeit] is deprecated, use #[timeit_sync] or #[timeit_async] instead";

/// Per-function state behind a decorated function.
///
/// The configuration is validated on first use; an invalid one panics at
/// every call.
pub struct Decorated {
    name: &'static str,
    config: TimeitConfig,
    legacy: bool,
    reporter: OnceLock<Arc<dyn Reporter>>,
    timeit: OnceLock<Result<Timeit, ConfigError>>,
    deprecation: Once,
}

impl Decorated {
    /// State for `#[timeit_sync]` and `#[timeit_async]`
    pub const fn new(name: &'static str, config: TimeitConfig) -> Self {
        Self {
            name,
            config,
            legacy: false,
            reporter: OnceLock::new(),
            timeit: OnceLock::new(),
            deprecation: Once::new(),
        }
    }

    /// State for the deprecated `#[timeit]` spelling
    pub const fn legacy(name: &'static str, config: TimeitConfig) -> Self {
        Self {
            name,
            config,
            legacy: true,
            reporter: OnceLock::new(),
            timeit: OnceLock::new(),
            deprecation: Once::new(),
        }
    }

    /// Route this function's events to `reporter` instead of the default.
    ///
    /// Only effective before the first call; returns whether it took.
    #[doc(hidden)]
    pub fn set_reporter(&self, reporter: Arc<dyn Reporter>) -> bool {
        self.timeit.get().is_none() && self.reporter.set(reporter).is_ok()
    }

    fn timeit(&self) -> &Timeit {
        let timeit = match self.timeit.get_or_init(|| {
            let timeit = Timeit::new(self.config.clone())?;
            Ok(match self.reporter.get() {
                Some(reporter) => timeit.with_reporter(reporter.clone()),
                None => timeit,
            })
        }) {
            Ok(timeit) => timeit,
            Err(e) => TimeitError::from(e.clone()).raise(),
        };
        if self.legacy {
            self.deprecation.call_once(|| {
                timeit.reporter.emit(
                    Level::WARN,
                    &ReportEvent::Deprecated {
                        name: self.name,
                        message: DEPRECATION,
                    },
                );
            });
        }
        timeit
    }

    /// Time a synchronous body
    pub fn invoke_sync<A, R, F>(&self, args: A, f: F) -> R
    where
        F: Fn(A) -> R + Sync,
        A: Clone + Debug + Sync,
        R: Send,
    {
        if nested_call() {
            return f(args);
        }
        let timed: TimedFn<F> = self.timeit().wrap(self.name, f);
        match timed.call(args) {
            Ok(value) => value,
            Err(e) => e.raise(),
        }
    }

    /// Time an async body
    pub async fn invoke_async<A, F, Fut>(&self, args: A, f: F) -> Fut::Output
    where
        F: Fn(A) -> Fut,
        Fut: Future,
        A: Clone + Debug,
    {
        if nested_call() {
            return f(args).await;
        }
        let timed: TimedAsyncFn<F> = self.timeit().wrap_async(self.name, f);
        match timed.call(args).await {
            Ok(value) => value,
            Err(e) => e.raise(),
        }
    }

    /// Time a registered body, possibly in worker processes
    pub fn invoke_process<A, R>(&self, args: A, target: &'static ProcessFn<A, R>) -> R
    where
        A: Serialize + Clone + Debug + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        if nested_call() {
            return target.call_local(args);
        }
        let timed: TimedProcessFn<A, R> = self.timeit().wrap_process(target).named(self.name);
        match timed.call(args) {
            Ok(value) => value,
            Err(e) => e.raise(),
        }
    }
}

/// Pins the output type of a generated async block
#[inline(always)]
pub fn async_body<R, Fut: Future<Output = R>>(fut: Fut) -> Fut {
    fut
}
