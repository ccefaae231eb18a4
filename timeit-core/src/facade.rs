//! Timing façade
//!
//! [`Timeit`] holds a validated configuration plus the injected reporter and
//! clock. Wrapping a callable yields a handle with the same calling
//! convention: [`TimedFn::call`] returns directly, [`TimedAsyncFn::call`]
//! must be awaited.

use crate::aggregate::Aggregate;
use crate::cancel::in_timed_run;
use crate::config::TimeitConfig;
use crate::error::{ConfigError, TimeitError};
use crate::measure::{Clock, MonotonicClock};
use crate::process::{self, ProcessFn, find_target, is_worker_process};
use crate::sample::TimingSample;
use crate::strategy::{Execution, Plan, cooperative, sequential, threads};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use timeit_report::{ReportEvent, Reporter, default_reporter};
use tracing::Level;

/// Calls made from inside a timed run, or inside a worker process, execute
/// the callable directly.
pub(crate) fn nested_call() -> bool {
    in_timed_run() || is_worker_process()
}

fn short_name(id: &str) -> &str {
    id.rsplit("::").next().unwrap_or(id)
}

/// Validated timing configuration with its collaborators
#[derive(Clone)]
pub struct Timeit {
    pub(crate) config: TimeitConfig,
    pub(crate) reporter: Arc<dyn Reporter>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Debug for Timeit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeit")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Timeit {
    /// Validate `config` and use the process-wide default reporter
    pub fn new(config: TimeitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            reporter: default_reporter(),
            clock: Arc::new(MonotonicClock::new()),
        })
    }

    /// Send events to `reporter` instead of the default
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Measure with `clock` instead of real time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The validated configuration
    pub fn config(&self) -> &TimeitConfig {
        &self.config
    }

    /// Wrap a synchronous callable taking its arguments as one value
    pub fn wrap<F>(&self, name: impl Into<String>, func: F) -> TimedFn<F> {
        TimedFn {
            timeit: self.clone(),
            name: name.into(),
            func,
        }
    }

    /// Wrap a callable returning a future
    pub fn wrap_async<F>(&self, name: impl Into<String>, func: F) -> TimedAsyncFn<F> {
        TimedAsyncFn {
            timeit: self.clone(),
            name: name.into(),
            func,
        }
    }

    /// Wrap a registered function, which may run on the processes substrate
    pub fn wrap_process<A: 'static, R: 'static>(
        &self,
        target: &'static ProcessFn<A, R>,
    ) -> TimedProcessFn<A, R> {
        TimedProcessFn {
            timeit: self.clone(),
            name: short_name(target.id()).to_string(),
            target,
        }
    }

    /// Time a registered function by id with JSON-encoded arguments
    pub fn call_registered(
        &self,
        target: &str,
        payload: &[u8],
    ) -> Result<Aggregate<serde_json::Value>, TimeitError> {
        let entry = find_target(target).ok_or_else(|| TimeitError::Serialization {
            target: target.to_string(),
            reason: "no function is registered under this id".to_string(),
        })?;

        let plan = Plan::blocking(&self.config)?;
        let exec = self.execution(short_name(entry.id), plan);
        let encoded = match plan {
            Plan::Processes => process::run_encoded(&exec, entry.id, payload)?,
            _ => self
                .run_local(&exec, plan, &(), &|()| (entry.invoke)(payload))?
                .into_iter()
                .map(process::flatten_invoke)
                .collect(),
        };
        let samples = encoded.into_iter().map(process::decode_sample).collect();

        Ok(self.finish(&exec, String::from_utf8_lossy(payload).into_owned(), samples))
    }

    fn execution<'a>(&'a self, name: &'a str, plan: Plan) -> Execution<'a> {
        Execution {
            name,
            runs: self.config.runs,
            workers: plan.workers(&self.config),
            policy: self.config.timeout_policy(),
            clock: &*self.clock,
            reporter: &*self.reporter,
        }
    }

    /// Drive a blocking plan in this process.
    ///
    /// Callers resolve `Processes` themselves; anything but `Threads` runs
    /// sequentially.
    fn run_local<A, R, F>(
        &self,
        exec: &Execution<'_>,
        plan: Plan,
        args: &A,
        f: &F,
    ) -> Result<Vec<TimingSample<R>>, TimeitError>
    where
        A: Clone + Sync,
        R: Send,
        F: Fn(A) -> R + Sync,
    {
        tracing::debug!(
            function = exec.name,
            runs = exec.runs,
            workers = exec.workers,
            ?plan,
            "timing call"
        );
        match plan {
            Plan::Threads => Ok(threads::run(exec, args, f)?),
            _ => Ok(sequential::run(exec, args, f)),
        }
    }

    fn finish<R>(
        &self,
        exec: &Execution<'_>,
        args: String,
        samples: Vec<TimingSample<R>>,
    ) -> Aggregate<R> {
        let aggregate = Aggregate::from_samples(exec.name, args, exec.runs, exec.workers, samples);
        self.report(&aggregate);
        aggregate
    }

    fn report<R>(&self, aggregate: &Aggregate<R>) {
        let reporter = &*self.reporter;
        let name = aggregate.name.as_str();

        for error in &aggregate.errors {
            reporter.emit(
                Level::ERROR,
                &ReportEvent::RunFailed {
                    name,
                    index: error.index,
                    message: &error.message,
                },
            );
        }
        if aggregate.all_cancelled() {
            reporter.emit(
                Level::WARN,
                &ReportEvent::AllCancelled {
                    name,
                    runs: aggregate.sample_count,
                },
            );
        }

        let summary = aggregate.summary();
        let level = self.config.log_level.as_tracing();
        if self.config.detailed {
            reporter.emit(level, &ReportEvent::Detailed(&summary));
        } else {
            reporter.emit(level, &ReportEvent::Summary(&summary));
        }
    }
}

/// A timed synchronous callable
pub struct TimedFn<F> {
    timeit: Timeit,
    name: String,
    func: F,
}

impl<F> TimedFn<F> {
    /// Name used in reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time the configured runs and return the representative value
    pub fn call<A, R>(&self, args: A) -> Result<R, TimeitError>
    where
        F: Fn(A) -> R + Sync,
        A: Clone + Debug + Sync,
        R: Send,
    {
        if nested_call() {
            return Ok((self.func)(args));
        }
        self.measure(args)?.into_result()
    }

    /// Time the configured runs and return the whole aggregate
    pub fn measure<A, R>(&self, args: A) -> Result<Aggregate<R>, TimeitError>
    where
        F: Fn(A) -> R + Sync,
        A: Clone + Debug + Sync,
        R: Send,
    {
        let plan = Plan::blocking(&self.timeit.config)?;
        if plan == Plan::Processes {
            return Err(TimeitError::Serialization {
                target: self.name.clone(),
                reason: "closures cannot run in a worker process; register the function \
                         with process_fn! and use Timeit::wrap_process"
                    .to_string(),
            });
        }

        let exec = self.timeit.execution(&self.name, plan);
        let samples = self.timeit.run_local(&exec, plan, &args, &self.func)?;
        Ok(self.timeit.finish(&exec, format!("{args:?}"), samples))
    }
}

/// A timed asynchronous callable
pub struct TimedAsyncFn<F> {
    timeit: Timeit,
    name: String,
    func: F,
}

impl<F> TimedAsyncFn<F> {
    /// Name used in reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Await the configured runs and return the representative value
    pub async fn call<A, Fut>(&self, args: A) -> Result<Fut::Output, TimeitError>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
        A: Clone + Debug,
    {
        if nested_call() {
            return Ok((self.func)(args).await);
        }
        self.measure(args).await?.into_result()
    }

    /// Await the configured runs and return the whole aggregate
    pub async fn measure<A, Fut>(&self, args: A) -> Result<Aggregate<Fut::Output>, TimeitError>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
        A: Clone + Debug,
    {
        let config = &self.timeit.config;
        let plan = Plan::suspendable(config)?;
        if config.timeout_policy().is_enforced() && tokio::runtime::Handle::try_current().is_err()
        {
            return Err(ConfigError::MissingRuntime.into());
        }

        let exec = self.timeit.execution(&self.name, plan);
        tracing::debug!(
            function = exec.name,
            runs = exec.runs,
            workers = exec.workers,
            "timing async call"
        );
        let samples = cooperative::run(&exec, |_| (self.func)(args.clone())).await;
        Ok(self.timeit.finish(&exec, format!("{args:?}"), samples))
    }
}

/// A timed function registered with [`process_fn!`](crate::process_fn)
pub struct TimedProcessFn<A: 'static, R: 'static> {
    timeit: Timeit,
    name: String,
    target: &'static ProcessFn<A, R>,
}

impl<A, R> TimedProcessFn<A, R>
where
    A: Serialize + Clone + Debug + Sync + 'static,
    R: DeserializeOwned + Send + 'static,
{
    /// Report under `name` instead of the registered id's last segment
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Time the configured runs and return the representative value
    pub fn call(&self, args: A) -> Result<R, TimeitError> {
        if nested_call() {
            return Ok(self.target.call_local(args));
        }
        self.measure(args)?.into_result()
    }

    /// Time the configured runs and return the whole aggregate
    pub fn measure(&self, args: A) -> Result<Aggregate<R>, TimeitError> {
        let plan = Plan::blocking(&self.timeit.config)?;
        let exec = self.timeit.execution(&self.name, plan);

        let samples = match plan {
            Plan::Processes => {
                let payload =
                    serde_json::to_vec(&args).map_err(|e| TimeitError::Serialization {
                        target: self.target.id().to_string(),
                        reason: e.to_string(),
                    })?;
                process::run_encoded(&exec, self.target.id(), &payload)?
                    .into_iter()
                    .map(process::decode_sample)
                    .collect()
            }
            _ => self
                .timeit
                .run_local(&exec, plan, &args, &|a| self.target.call_local(a))?,
        };
        Ok(self.timeit.finish(&exec, format!("{args:?}"), samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Substrate;
    use crate::measure::SteppedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use timeit_report::MemoryReporter;

    fn timeit(config: TimeitConfig) -> (Timeit, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let timeit = Timeit::new(config).unwrap().with_reporter(reporter.clone());
        (timeit, reporter)
    }

    fn square(n: u64) -> u64 {
        n * n
    }

    crate::process_fn! {
        static SQUARE: fn(u64) -> u64 = square;
    }

    #[test]
    fn test_single_run_is_identity() {
        let (timeit, reporter) = timeit(TimeitConfig::new());
        let timed = timeit.wrap("square", square);

        let aggregate = timed.measure(9).unwrap();
        assert_eq!(aggregate.sample_count, 1);
        assert_eq!(aggregate.into_result().unwrap(), square(9));
        assert_eq!(reporter.count_containing("square: Exec: "), 1);
    }

    #[test]
    fn test_sample_count_matches_runs() {
        let (timeit, _) = timeit(TimeitConfig::new().runs(7).workers(3));
        let aggregate = timeit.wrap("square", square).measure(3).unwrap();
        assert_eq!(aggregate.sample_count, 7);
        assert_eq!(aggregate.workers, 3);
        assert_eq!(aggregate.statistics.unwrap().sample_count, 7);
    }

    #[test]
    fn test_stepped_clock_gives_zero_variance() {
        let (timeit, reporter) = timeit(TimeitConfig::new().runs(5).substrate(Substrate::None));
        let timeit = timeit.with_clock(Arc::new(SteppedClock::new(Duration::from_millis(10))));

        let aggregate = timeit.wrap("square", square).measure(4).unwrap();
        let stats = aggregate.statistics.unwrap();
        assert_eq!(stats.mean, stats.median);
        assert_eq!(stats.min, stats.max);
        assert_eq!(stats.std_dev, 0.0);
        assert!((stats.mean - 0.01).abs() < 1e-12);
        assert_eq!(aggregate.representative.unwrap(), 16);
        assert_eq!(
            reporter.count_containing("square: Avg: 0.010s, Med: 0.010s"),
            1
        );
    }

    #[test]
    fn test_observed_timeout_warns_once_per_run() {
        let (timeit, reporter) = timeit(TimeitConfig::new().runs(3).timeout(0.005));
        let timeit = timeit.with_clock(Arc::new(SteppedClock::new(Duration::from_millis(20))));

        let aggregate = timeit.wrap("slow", |x: u8| x).measure(1).unwrap();
        assert_eq!(aggregate.timed_out, 3);
        assert_eq!(aggregate.statistics.unwrap().sample_count, 3);
        assert_eq!(reporter.at_level(Level::WARN).len(), 3);
        assert_eq!(aggregate.into_result().unwrap(), 1);
    }

    #[test]
    fn test_all_cancelled_is_an_error() {
        let (timeit, reporter) = timeit(
            TimeitConfig::new()
                .runs(3)
                .workers(3)
                .timeout(0.001)
                .enforce_timeout(true),
        );
        let timeit = timeit.with_clock(Arc::new(SteppedClock::new(Duration::from_millis(50))));

        let result = timeit.wrap("stuck", |()| "stale").call(());
        assert!(matches!(result, Err(TimeitError::AllCancelled { runs: 3, .. })));
        assert_eq!(reporter.count_containing("all 3 executions were cancelled"), 1);
    }

    #[test]
    fn test_failure_past_enforced_deadline_still_reported() {
        let (timeit, reporter) = timeit(
            TimeitConfig::new()
                .runs(2)
                .substrate(Substrate::None)
                .timeout(0.01)
                .enforce_timeout(true),
        );
        let aggregate = timeit
            .wrap("give_up", |()| -> u8 {
                std::thread::sleep(Duration::from_millis(30));
                crate::checkpoint().expect("gave up");
                1
            })
            .measure(())
            .unwrap();

        assert_eq!(aggregate.cancelled, 2);
        assert_eq!(aggregate.failed, 2);
        assert!(aggregate.errors.iter().all(|e| e.message.contains("gave up")));
        assert!(aggregate.statistics.is_none());
        assert_eq!(reporter.at_level(Level::ERROR).len(), 2);
        assert!(matches!(
            aggregate.into_result(),
            Err(TimeitError::AllCancelled { runs: 2, .. })
        ));
    }

    #[test]
    fn test_closure_rejected_for_processes() {
        let calls = AtomicUsize::new(0);
        let (timeit, _) = timeit(
            TimeitConfig::new()
                .runs(2)
                .workers(2)
                .substrate(Substrate::Processes),
        );
        let result = timeit
            .wrap("lambda", |x: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                x
            })
            .call(1);

        assert!(matches!(result, Err(TimeitError::Serialization { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panics_reported_and_reraised_as_run_failed() {
        let (timeit, reporter) = timeit(TimeitConfig::new().runs(2).substrate(Substrate::None));
        let result = timeit
            .wrap("broken", |()| -> u8 { panic!("bad input") })
            .call(());

        match result {
            Err(TimeitError::RunFailed { error, .. }) => assert_eq!(error.message, "bad input"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(reporter.at_level(Level::ERROR).len(), 2);
    }

    #[test]
    fn test_nested_call_runs_untimed() {
        let (outer_timeit, reporter) = timeit(TimeitConfig::new().runs(2).substrate(Substrate::None));
        let inner = outer_timeit.wrap("inner", |x: u32| x + 1);

        let outer = outer_timeit.wrap("outer", |x: u32| inner.call(x).unwrap() * 10);
        assert_eq!(outer.call(1).unwrap(), 20);

        // Only the outer call reports a summary
        assert_eq!(reporter.count_containing("outer: Avg"), 1);
        assert_eq!(reporter.count_containing("inner:"), 0);
    }

    #[test]
    fn test_detailed_report_uses_configured_level() {
        let (timeit, reporter) = timeit(
            TimeitConfig::new()
                .runs(2)
                .detailed(true)
                .log_level(crate::config::LogLevel::Debug),
        );
        timeit.wrap("square", square).call(2).unwrap();

        let events = reporter.at_level(Level::DEBUG);
        assert_eq!(events.len(), 1);
        assert!(events[0].message.starts_with("Function"));
        assert!(events[0].message.contains("Args           2"));
    }

    #[test]
    fn test_process_fn_runs_locally_on_threads() {
        let (timeit, _) = timeit(TimeitConfig::new().runs(4).workers(2));
        let timed = timeit.wrap_process(&SQUARE);
        assert_eq!(timed.call(5).unwrap(), 25);
    }

    #[test]
    fn test_call_registered_locally() {
        let (timeit, _) = timeit(TimeitConfig::new().runs(2));
        let aggregate = timeit.call_registered(SQUARE.id(), b"12").unwrap();
        assert_eq!(aggregate.name, "SQUARE");
        assert_eq!(aggregate.into_result().unwrap(), serde_json::json!(144));

        let bad = timeit.call_registered(SQUARE.id(), b"\"twelve\"");
        assert!(matches!(bad, Err(TimeitError::RunFailed { .. })));

        let missing = timeit.call_registered("no::such::FN", b"1");
        assert!(matches!(missing, Err(TimeitError::Serialization { .. })));
    }

    #[tokio::test]
    async fn test_async_last_completed_wins() {
        let (timeit, _) = timeit(TimeitConfig::new().runs(3).workers(3));
        let counter = AtomicUsize::new(0);

        // Later submissions finish first; the representative is still the
        // value of the last submitted run.
        let timed = timeit.wrap_async("fetch", |()| {
            let ticket = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(30 - ticket as u64 * 10)).await;
                ticket
            }
        });
        assert_eq!(timed.call(()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_async_enforced_timeout_cancels() {
        let (timeit, _) = timeit(
            TimeitConfig::new()
                .runs(2)
                .workers(2)
                .timeout(0.02)
                .enforce_timeout(true)
                .substrate(Substrate::Cooperative),
        );
        let timed = timeit.wrap_async("hang", |()| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let aggregate = timed.measure(()).await.unwrap();
        assert_eq!(aggregate.cancelled, 2);
        assert!(aggregate.statistics.is_none());
        assert!(matches!(
            aggregate.representative,
            Err(TimeitError::AllCancelled { .. })
        ));
    }

    #[test]
    fn test_async_rejects_processes() {
        let (timeit, _) = timeit(TimeitConfig::new().runs(2).substrate(Substrate::Processes));
        let timed = timeit.wrap_async("remote", |()| async { 1 });
        let result = futures::executor::block_on(timed.call(()));
        assert!(matches!(
            result,
            Err(TimeitError::Config(ConfigError::ProcessesRequireSync))
        ));
    }

    #[test]
    fn test_sync_rejects_cooperative() {
        let (timeit, _) = timeit(TimeitConfig::new().substrate(Substrate::Cooperative));
        let result = timeit.wrap("sync", |()| 1).call(());
        assert!(matches!(
            result,
            Err(TimeitError::Config(ConfigError::CooperativeRequiresAsync))
        ));
    }
}
