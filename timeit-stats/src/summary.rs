//! Summary Statistics
//!
//! Durations are plain `f64` seconds. The caller decides which runs are
//! included (cancelled runs never reach this module).

use crate::percentiles::compute_percentile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Summary of the included run durations, all values in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Number of durations summarized
    pub sample_count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// 50th percentile
    pub median: f64,
    /// Shortest duration
    pub min: f64,
    /// Longest duration
    pub max: f64,
    /// Sample standard deviation (N-1), 0 for fewer than two samples
    pub std_dev: f64,
    /// Sum of all durations
    pub total: f64,
}

/// Compute summary statistics; an empty slice yields all zeros
pub fn compute_summary(samples: &[f64]) -> SummaryStatistics {
    if samples.is_empty() {
        return SummaryStatistics::default();
    }

    let count = samples.len();
    let total: f64 = samples.iter().sum();
    let mean = total / count as f64;

    let std_dev = if count < 2 {
        0.0
    } else {
        let variance =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    };

    let min = samples
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(0.0);
    let max = samples
        .iter()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(0.0);

    SummaryStatistics {
        sample_count: count,
        mean,
        median: compute_percentile(samples, 50.0),
        min,
        max,
        std_dev,
        total,
    }
}
