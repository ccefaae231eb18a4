//! Percentile Computation
//!
//! Linear interpolation between nearest ranks. The median reported by
//! [`compute_summary`](crate::compute_summary) is the 50th percentile, which
//! averages the two middle values for an even sample count.

use std::cmp::Ordering;

/// Compute a single percentile from samples
///
/// # Examples
///
/// ```
/// # use timeit_stats::compute_percentile;
/// let samples = vec![1.0, 2.0, 3.0, 4.0];
/// assert_eq!(compute_percentile(&samples, 50.0), 2.5);
/// assert_eq!(compute_percentile(&samples, 100.0), 4.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    match samples.len() {
        0 => return 0.0,
        1 => return samples[0],
        _ => {}
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let last = sorted.len() - 1;
    let rank = (percentile.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(last);
    let fraction = rank - lower as f64;

    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_median() {
        assert_eq!(compute_percentile(&[5.0, 1.0, 3.0], 50.0), 3.0);
    }

    #[test]
    fn test_even_median_interpolates() {
        assert_eq!(compute_percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
    }

    #[test]
    fn test_bounds() {
        let samples = [4.0, 2.0, 8.0, 6.0];
        assert_eq!(compute_percentile(&samples, 0.0), 2.0);
        assert_eq!(compute_percentile(&samples, 100.0), 8.0);
        // Out-of-range requests are clamped
        assert_eq!(compute_percentile(&samples, 250.0), 8.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(compute_percentile(&[], 50.0), 0.0);
        assert_eq!(compute_percentile(&[7.5], 90.0), 7.5);
    }
}
