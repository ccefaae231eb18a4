//! Wall-clock measurement
//!
//! Runs are timed through a [`Clock`] so tests can swap in a deterministic
//! source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Real time, relative to construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Advances by a fixed step on every reading.
///
/// Each run reads the clock twice, so every run measures exactly one step.
#[derive(Debug)]
pub struct SteppedClock {
    step_nanos: u64,
    ticks: AtomicU64,
}

impl SteppedClock {
    /// Clock whose readings are `step` apart
    pub fn new(step: Duration) -> Self {
        Self {
            step_nanos: u64::try_from(step.as_nanos()).unwrap_or(u64::MAX),
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> Duration {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        Duration::from_nanos(tick.saturating_mul(self.step_nanos))
    }
}

/// Measures one interval against a clock
pub struct Timer<'a> {
    clock: &'a dyn Clock,
    start: Duration,
}

impl<'a> Timer<'a> {
    /// Start timing now
    #[inline]
    pub fn start(clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            start: clock.now(),
        }
    }

    /// Time since [`Timer::start`]
    #[inline]
    pub fn stop(&self) -> Duration {
        self.clock.now().saturating_sub(self.start)
    }
}
