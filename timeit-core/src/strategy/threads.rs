//! Thread-pool strategy

use super::Execution;
use crate::sample::TimingSample;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

/// Fan `runs` invocations out over a pool built for this call.
///
/// The indexed parallel iterator collects in submission order. The pool is
/// dropped before returning.
pub(crate) fn run<A, R, F>(
    exec: &Execution<'_>,
    args: &A,
    f: &F,
) -> Result<Vec<TimingSample<R>>, rayon::ThreadPoolBuildError>
where
    A: Clone + Sync,
    R: Send,
    F: Fn(A) -> R + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(exec.workers)
        .thread_name(|i| format!("timeit-worker-{i}"))
        .build()?;

    tracing::debug!(
        function = exec.name,
        runs = exec.runs,
        workers = exec.workers,
        "starting thread pool"
    );

    Ok(pool.install(|| {
        (0..exec.runs)
            .into_par_iter()
            .map(|index| exec.policy.run_blocking(index, exec, || f(args.clone())))
            .collect()
    }))
}
