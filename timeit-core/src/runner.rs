//! Single-execution runner

use crate::cancel::{RunScope, Scoped};
use crate::error::{RunError, RunErrorKind};
use crate::measure::{Clock, Timer};
use crate::sample::TimingSample;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute `f` once on the current thread.
///
/// A panic becomes a failed sample carrying the time up to the unwind.
pub fn run_blocking<R>(
    index: usize,
    clock: &dyn Clock,
    deadline: Option<Instant>,
    f: impl FnOnce() -> R,
) -> TimingSample<R> {
    let _scope = RunScope::enter(deadline);
    let timer = Timer::start(clock);
    let result = catch_unwind(AssertUnwindSafe(f));
    let elapsed = timer.stop();

    match result {
        Ok(value) => TimingSample::completed(index, elapsed, value),
        Err(payload) => TimingSample::failed(
            index,
            elapsed,
            RunError::new(index, RunErrorKind::Panic, panic_message(payload.as_ref())),
        ),
    }
}

/// Await `fut` once, timing across its suspension points
pub async fn run_suspendable<Fut: Future>(
    index: usize,
    clock: &dyn Clock,
    deadline: Option<Instant>,
    fut: Fut,
) -> TimingSample<Fut::Output> {
    let timer = Timer::start(clock);
    let result = AssertUnwindSafe(Scoped::new(fut, deadline))
        .catch_unwind()
        .await;
    let elapsed = timer.stop();

    match result {
        Ok(value) => TimingSample::completed(index, elapsed, value),
        Err(payload) => TimingSample::failed(
            index,
            elapsed,
            RunError::new(index, RunErrorKind::Panic, panic_message(payload.as_ref())),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::in_timed_run;
    use crate::measure::{MonotonicClock, SteppedClock};
    use crate::sample::Outcome;
    use std::time::Duration;

    #[test]
    fn test_blocking_returns_value() {
        let clock = SteppedClock::new(Duration::from_millis(2));
        let sample = run_blocking(0, &clock, None, || 6 * 7);
        assert_eq!(sample.value, Some(42));
        assert_eq!(sample.elapsed, Duration::from_millis(2));
        assert_eq!(sample.outcome, Outcome::Completed);
    }

    #[test]
    fn test_blocking_marks_thread() {
        let clock = MonotonicClock::new();
        let sample = run_blocking(0, &clock, None, in_timed_run);
        assert_eq!(sample.value, Some(true));
        assert!(!in_timed_run());
    }

    #[test]
    fn test_blocking_captures_panic() {
        let clock = MonotonicClock::new();
        let sample = run_blocking(5, &clock, None, || -> u8 { panic!("boom {}", 1) });
        let error = sample.error.unwrap();
        assert_eq!(error.index, 5);
        assert_eq!(error.kind, RunErrorKind::Panic);
        assert_eq!(error.message, "boom 1");
        assert_eq!(sample.outcome, Outcome::Completed);
    }

    #[test]
    fn test_panic_message_fallback() {
        let payload: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_suspendable_measures_across_await() {
        let clock = MonotonicClock::new();
        let sample = run_suspendable(1, &clock, None, async {
            tokio::time::sleep(Duration::from_millis(15)).await;
            "done"
        })
        .await;
        assert_eq!(sample.value, Some("done"));
        assert!(sample.elapsed >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_suspendable_captures_panic() {
        let clock = MonotonicClock::new();
        let fail = true;
        let sample = run_suspendable(2, &clock, None, async move {
            tokio::task::yield_now().await;
            if fail {
                panic!("async boom");
            }
            7u8
        })
        .await;
        assert_eq!(sample.error.unwrap().message, "async boom");
    }
}
