//! Cooperative strategy
//!
//! All units run on the caller's task. A semaphore with `workers` permits
//! bounds how many are in flight; each unit holds its permit until its
//! sample is recorded, whether it finished or was cancelled.

use super::Execution;
use crate::error::{RunError, RunErrorKind};
use crate::sample::TimingSample;
use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;

pub(crate) async fn run<Fut, G>(exec: &Execution<'_>, make_unit: G) -> Vec<TimingSample<Fut::Output>>
where
    G: Fn(usize) -> Fut,
    Fut: Future,
{
    let gate = Semaphore::new(exec.workers);
    let gate = &gate;

    let units = (0..exec.runs).map(|index| {
        let unit = make_unit(index);
        async move {
            let _permit = match gate.acquire().await {
                Ok(permit) => permit,
                Err(closed) => {
                    return TimingSample::failed(
                        index,
                        Duration::ZERO,
                        RunError::new(index, RunErrorKind::WorkerLost, closed.to_string()),
                    );
                }
            };
            exec.policy.run_suspendable(index, exec, unit).await
        }
    });

    join_all(units).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonotonicClock;
    use crate::timeout::TimeoutPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use timeit_report::MemoryReporter;

    fn exec<'a>(
        clock: &'a MonotonicClock,
        reporter: &'a MemoryReporter,
        runs: usize,
        workers: usize,
        policy: TimeoutPolicy,
    ) -> Execution<'a> {
        Execution {
            name: "coop",
            runs,
            workers,
            policy,
            clock,
            reporter,
        }
    }

    #[tokio::test]
    async fn test_admission_gate_bounds_in_flight() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let exec = exec(&clock, &reporter, 9, 3, TimeoutPolicy::Unbounded);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let samples = run(&exec, |index| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                index * 2
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let values: Vec<_> = samples.iter().map(|s| s.value.unwrap()).collect();
        assert_eq!(values, (0..9).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancelled_units_release_permits() {
        let clock = MonotonicClock::new();
        let reporter = MemoryReporter::new();
        let exec = exec(
            &clock,
            &reporter,
            4,
            1,
            TimeoutPolicy::Enforce(Duration::from_millis(15)),
        );

        // Odd runs hang; with a single permit every later run would starve
        // if a cancelled unit kept its permit.
        let samples = run(&exec, |index| async move {
            if index % 2 == 1 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            index
        })
        .await;

        let cancelled: Vec<_> = samples.iter().map(|s| s.is_cancelled()).collect();
        assert_eq!(cancelled, vec![false, true, false, true]);
        assert_eq!(samples[2].value, Some(2));
    }
}
