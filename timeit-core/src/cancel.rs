//! Run context and interrupt checkpoints
//!
//! Threads cannot be killed, so an enforced deadline on a blocking run is
//! published to the thread executing it. Long-running callables poll
//! [`is_cancelled`] or [`checkpoint`] to give up early; whatever they do, the
//! run is recorded as cancelled once it returns past the deadline.
//!
//! The same context marks the thread as being inside a timed run, which is
//! what lets a decorated function called from another one run untimed.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Returned by [`checkpoint`] once the run's enforced deadline has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled at its enforced deadline")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy)]
struct RunContext {
    deadline: Option<Instant>,
}

thread_local! {
    static CURRENT_RUN: Cell<Option<RunContext>> = const { Cell::new(None) };
}

/// Marks the current thread as executing a timed run until dropped
pub(crate) struct RunScope {
    previous: Option<RunContext>,
}

impl RunScope {
    pub(crate) fn enter(deadline: Option<Instant>) -> Self {
        let previous = CURRENT_RUN.with(|run| run.replace(Some(RunContext { deadline })));
        Self { previous }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        CURRENT_RUN.with(|run| run.set(self.previous));
    }
}

/// Whether the current thread is executing a timed run
pub fn in_timed_run() -> bool {
    CURRENT_RUN.with(|run| run.get().is_some())
}

/// Whether the current run has passed its enforced deadline.
///
/// Always `false` outside a timed run or when the timeout is only observed.
pub fn is_cancelled() -> bool {
    CURRENT_RUN.with(|run| {
        run.get()
            .and_then(|ctx| ctx.deadline)
            .is_some_and(|deadline| Instant::now() >= deadline)
    })
}

/// Interrupt point for blocking callables.
///
/// ```
/// fn crunch(items: &[u64]) -> Result<u64, timeit_core::Cancelled> {
///     let mut acc = 0;
///     for item in items {
///         timeit_core::checkpoint()?;
///         acc += item;
///     }
///     Ok(acc)
/// }
/// assert_eq!(crunch(&[1, 2, 3]), Ok(6));
/// ```
pub fn checkpoint() -> Result<(), Cancelled> {
    if is_cancelled() { Err(Cancelled) } else { Ok(()) }
}

/// Time left before the current run's enforced deadline
pub fn remaining() -> Option<Duration> {
    CURRENT_RUN.with(|run| {
        run.get()
            .and_then(|ctx| ctx.deadline)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    })
}

/// Installs a run context around every poll of the inner future.
///
/// Cooperative runs interleave on one thread, so the context cannot simply
/// be set for the whole run.
pub(crate) struct Scoped<F> {
    inner: Pin<Box<F>>,
    deadline: Option<Instant>,
}

impl<F: Future> Scoped<F> {
    pub(crate) fn new(inner: F, deadline: Option<Instant>) -> Self {
        Self {
            inner: Box::pin(inner),
            deadline,
        }
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _scope = RunScope::enter(this.deadline);
        this.inner.as_mut().poll(cx)
    }
}
