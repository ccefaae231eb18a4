//! timeit decorator tour
//!
//! Run with:
//!   cargo run --example decorators
//!   TIMEIT_LOG=debug cargo run --example decorators   # detailed tables

use std::time::Duration;
use timeit::prelude::*;

/// Single run: logs "word_count: Exec: ...s"
#[timeit_sync]
fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Five runs on two threads: logs average and median
#[timeit_sync(runs = 5, workers = 2)]
fn checksum(data: Vec<u8>) -> u32 {
    data.iter().map(|&b| b as u32).sum()
}

/// Full table at debug level
#[timeit_sync(runs = 4, substrate = "none", detailed = true, log_level = "debug")]
fn sort_copy(mut values: Vec<i64>) -> Vec<i64> {
    values.sort_unstable();
    values
}

/// Observed timeout: late runs are reported and kept
#[timeit_sync(runs = 3, workers = 3, timeout = "5ms")]
fn sometimes_slow(delay_ms: u64) -> u64 {
    std::thread::sleep(Duration::from_millis(delay_ms));
    delay_ms
}

/// Enforced timeout on blocking code: the loop polls its deadline
#[timeit_sync(runs = 2, workers = 2, timeout = "20ms", enforce_timeout = true)]
fn bounded_search(target: u64) -> Option<u64> {
    let mut candidate = 0;
    while candidate < target {
        if is_cancelled() {
            return None;
        }
        candidate += 1;
    }
    Some(candidate)
}

/// Worker processes: each run happens in a re-executed copy of this binary
#[timeit_sync(runs = 4, workers = 2, substrate = "processes")]
fn isolated_fib(n: u64) -> u64 {
    fn fib(n: u64) -> u64 {
        if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
    }
    fib(n)
}

/// Async runs interleave on one task, two in flight at a time
#[timeit_async(runs = 4, workers = 2, timeout = "50ms", enforce_timeout = true)]
async fn fetch(id: u32) -> String {
    tokio::time::sleep(Duration::from_millis(10)).await;
    format!("record-{id}")
}

fn main() -> anyhow::Result<()> {
    timeit::process::run_worker_if_requested();
    timeit::init_tracing();

    word_count("the quick brown fox");
    checksum((0..=255).collect());
    sort_copy(vec![5, 3, 9, 1]);
    sometimes_slow(10);
    println!("bounded_search = {:?}", bounded_search(1_000));
    println!("isolated_fib(25) = {}", isolated_fib(25));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    println!("{}", runtime.block_on(fetch(7)));

    // The same machinery without macros
    let timeit = Timeit::new(TimeitConfig::new().runs(8).workers(4))?;
    let aggregate = timeit
        .wrap("parse", |s: &str| s.parse::<u64>().unwrap_or(0))
        .measure("12345")?;
    if let Some(stats) = aggregate.statistics {
        println!("parse: mean {:.9}s over {} runs", stats.mean, stats.sample_count);
    }

    Ok(())
}
