#![warn(missing_docs)]
//! timeit Statistical Engine
//!
//! Reduces per-run wall-clock durations (in seconds) into the summary the
//! reporter prints:
//! - Mean, median, min, max
//! - Sample standard deviation (N-1 denominator)
//! - Total of all included durations
//!
//! No outlier rejection or resampling happens here: every duration handed in
//! is part of the result.

mod percentiles;
mod summary;

pub use percentiles::compute_percentile;
pub use summary::{SummaryStatistics, compute_summary};
