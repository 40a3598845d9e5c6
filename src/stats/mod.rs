//! Averaging primitives used by the aggregation rows.
//!
//! - [`mean`]: arithmetic mean
//! - [`weighted_mean`]: weighted mean that falls back to [`mean`] when every
//!   weight is zero
//! - [`Summary`]: descriptive statistics over per-case scores

use serde::{Deserialize, Serialize};

/// Descriptive statistics for a set of scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Mean value.
    pub mean: f64,
    /// Median value.
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
}

impl Summary {
    /// Compute summary statistics for a slice of values.
    ///
    /// Returns `None` if the slice is empty.
    #[must_use]
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let mean = mean(&sorted);
        let variance: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            mean,
            median: median_sorted(&sorted),
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[count - 1],
        })
    }
}

/// Compute arithmetic mean.
///
/// Returns 0.0 for an empty slice.
///
/// # Example
///
/// ```
/// use dice_eval::stats::mean;
///
/// assert!((mean(&[1.0, 2.0, 3.0, 4.0, 5.0]) - 3.0).abs() < 0.001);
/// ```
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compute a weighted mean of `values`.
///
/// When the weights sum to zero the unweighted [`mean`] is returned instead,
/// so a case or dataset without any ground-truth voxels still yields a
/// finite score.
///
/// # Example
///
/// ```
/// use dice_eval::stats::weighted_mean;
///
/// assert_eq!(weighted_mean(&[0.8, 1.0], &[100.0, 0.0]), 0.8);
/// assert_eq!(weighted_mean(&[0.5, 1.0], &[0.0, 0.0]), 0.75);
/// ```
#[must_use]
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return mean(values);
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}

/// Median of an ascending slice; the mean of the middle pair for even lengths.
fn median_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
