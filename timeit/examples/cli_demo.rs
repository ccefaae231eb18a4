//! timeit CLI demo
//!
//! Registers a few functions and hands `main` to the timeit CLI.
//!
//! Run with:
//!   cargo run --example cli_demo -- list
//!   cargo run --example cli_demo -- run FIB --args 27 --runs 6 --workers 3 --substrate processes
//!   cargo run --example cli_demo -- run word_lengths --args '"to be or not"' --format json

use timeit::timeit_sync;

fn fib(n: u64) -> u64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

timeit::process_fn! {
    /// Naive Fibonacci
    pub static FIB: fn(u64) -> u64 = fib;
}

/// Also registered, through the decorator
#[allow(dead_code)]
#[timeit_sync(runs = 2, workers = 2, substrate = "processes")]
fn word_lengths(text: String) -> Vec<usize> {
    text.split_whitespace().map(str::len).collect()
}

fn main() -> anyhow::Result<()> {
    timeit::run()
}
