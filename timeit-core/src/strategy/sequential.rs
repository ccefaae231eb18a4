//! Back-to-back runs on the caller's thread

use super::Execution;
use crate::sample::TimingSample;

pub(crate) fn run<A, R, F>(exec: &Execution<'_>, args: &A, f: &F) -> Vec<TimingSample<R>>
where
    A: Clone,
    F: Fn(A) -> R,
{
    (0..exec.runs)
        .map(|index| exec.policy.run_blocking(index, exec, || f(args.clone())))
        .collect()
}
