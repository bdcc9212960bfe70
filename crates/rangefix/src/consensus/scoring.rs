//! Hypothesis scoring for the consensus variants.

use crate::model::Point;

/// LMedS robust scale factor (asymptotic consistency with a Gaussian core).
const LMEDS_SCALE: f64 = 1.4826;
/// Inlier gate in robust standard deviations.
const LMEDS_GATE: f64 = 2.5;

/// Absolute range residual of every reading under a candidate position, in
/// fingerprint order.
pub(crate) fn residuals<const D: usize>(
    candidate: &Point<D>,
    positions: &[Point<D>],
    distances: &[f64],
) -> Vec<f64> {
    positions
        .iter()
        .zip(distances)
        .map(|(p, d)| ((candidate - p).norm() - d).abs())
        .collect()
}

/// Number of residuals at or below the threshold.
pub(crate) fn support(residuals: &[f64], threshold: f64) -> usize {
    residuals.iter().filter(|&&r| r <= threshold).count()
}

/// Number of prefix residuals at or below the threshold.
pub(crate) fn prefix_support(residuals: &[f64], prefix: &[usize], threshold: f64) -> usize {
    prefix.iter().filter(|&&i| residuals[i] <= threshold).count()
}

/// MSAC cost: squared residuals capped at the squared threshold, so
/// outliers pay a constant penalty instead of their true magnitude.
pub(crate) fn msac_cost(residuals: &[f64], threshold: f64) -> f64 {
    let cap = threshold * threshold;
    residuals.iter().map(|&r| (r * r).min(cap)).sum()
}

/// Median of the squared residuals.
pub(crate) fn median_squared(residuals: &[f64]) -> f64 {
    let mut squared: Vec<f64> = residuals.iter().map(|&r| r * r).collect();
    squared.sort_by(|a, b| a.partial_cmp(b).unwrap());
    squared[squared.len() / 2]
}

/// Inlier threshold derived post hoc from the winning median via the
/// standard LMedS robust scale estimate, with the small-sample correction
/// `1 + 5/(n - m)`.
pub(crate) fn lmeds_threshold(median_sq: f64, n_readings: usize, subset_size: usize) -> f64 {
    let dof = n_readings.saturating_sub(subset_size).max(1);
    let sigma = LMEDS_SCALE * (1.0 + 5.0 / dof as f64) * median_sq.max(0.0).sqrt();
    LMEDS_GATE * sigma
}

/// Inlier flags and count under a threshold.
pub(crate) fn flag_inliers(residuals: &[f64], threshold: f64) -> (Vec<bool>, usize) {
    let flags: Vec<bool> = residuals.iter().map(|&r| r <= threshold).collect();
    let count = flags.iter().filter(|&&f| f).count();
    (flags, count)
}
