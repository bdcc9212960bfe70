//! Inlier-set refinement and covariance of the final estimate.

use nalgebra::{Cholesky, Const, DimMin, SMatrix};

use crate::error::{EstimateError, SolveError};
use crate::model::{Point, ReadingSet};
use crate::solver::{self, RangeProblem};

/// Re-solve the position over the inlier set with the nonlinear solver,
/// seeded at the consensus winner.
pub(crate) fn refine_on_inliers<const D: usize>(
    data: &ReadingSet<D>,
    inliers: &[bool],
    seed: Point<D>,
) -> Result<Point<D>, SolveError>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    let problem = RangeProblem::from_inliers(data, inliers);
    solver::solve_nonlinear(&problem, seed, solver::NONLINEAR_MAX_ITERATIONS)
}

/// Covariance of the estimate at `position` from the inlier set.
///
/// Gauss-Newton approximation `Σ = (Jᵀ W J)⁻¹` with unit line-of-sight
/// Jacobian rows and weights that already carry the reading variances (and
/// source position covariances when that option is enabled). A factorization
/// failure means the information matrix is not positive definite and is
/// reported, not clamped.
pub(crate) fn covariance_on_inliers<const D: usize>(
    data: &ReadingSet<D>,
    inliers: &[bool],
    position: &Point<D>,
) -> Result<SMatrix<f64, D, D>, EstimateError> {
    let mut information = SMatrix::<f64, D, D>::zeros();
    for i in 0..data.len() {
        if !inliers[i] {
            continue;
        }
        let delta = position - data.positions[i];
        let range = delta.norm();
        if range < 1e-12 {
            continue;
        }
        let u = delta / range;
        information += data.weights[i] * u * u.transpose();
    }

    let chol =
        Cholesky::new(information).ok_or(EstimateError::CovarianceNotPositiveDefinite)?;
    let covariance = chol.inverse();
    if !covariance.iter().all(|c| c.is_finite()) {
        return Err(EstimateError::CovarianceNotPositiveDefinite);
    }
    Ok(covariance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn ring_data(truth: Vector2<f64>, n: usize, sigma: f64) -> ReadingSet<2> {
        let positions: Vec<Vector2<f64>> = (0..n)
            .map(|i| {
                let theta = i as f64 * std::f64::consts::TAU / n as f64;
                Vector2::new(25.0 * theta.cos(), 25.0 * theta.sin())
            })
            .collect();
        let distances: Vec<f64> = positions.iter().map(|p| (truth - p).norm()).collect();
        ReadingSet {
            sigmas: vec![sigma; n],
            weights: vec![1.0 / (sigma * sigma); n],
            quality: vec![1.0; n],
            source_of: (0..n).collect(),
            by_source: (0..n).map(|i| vec![i]).collect(),
            positions,
            distances,
        }
    }

    #[test]
    fn refinement_recovers_truth_from_inliers_only() {
        let truth = Vector2::new(2.0, 7.0);
        let mut data = ring_data(truth, 8, 1.0);
        // Corrupt two readings and exclude them from the inlier set.
        data.distances[1] += 30.0;
        data.distances[5] -= 20.0;
        let inliers: Vec<bool> = (0..8).map(|i| i != 1 && i != 5).collect();

        let refined =
            refine_on_inliers(&data, &inliers, Vector2::new(1.0, 6.0)).expect("refine");
        assert_relative_eq!(refined, truth, epsilon = 1e-6);
    }

    #[test]
    fn covariance_scales_with_reading_variance() {
        let truth = Vector2::new(0.0, 0.0);
        let tight = ring_data(truth, 12, 0.1);
        let loose = ring_data(truth, 12, 1.0);
        let inliers = vec![true; 12];

        let cov_tight = covariance_on_inliers(&tight, &inliers, &truth).expect("tight");
        let cov_loose = covariance_on_inliers(&loose, &inliers, &truth).expect("loose");
        // 10x the sigma means 100x the variance.
        assert_relative_eq!(cov_loose[(0, 0)] / cov_tight[(0, 0)], 100.0, epsilon = 1e-6);
        // Symmetric ring geometry gives a near-isotropic covariance.
        assert_relative_eq!(cov_loose[(0, 0)], cov_loose[(1, 1)], epsilon = 1e-9);
        assert_relative_eq!(cov_loose[(0, 1)], cov_loose[(1, 0)], epsilon = 1e-12);
    }

    #[test]
    fn degenerate_inlier_geometry_is_a_covariance_error() {
        let truth = Vector2::new(0.0, 5.0);
        // Every reading shares one line of sight: no information across it.
        let positions = vec![Vector2::new(0.0, 0.0); 4];
        let distances = vec![5.0; 4];
        let data = ReadingSet {
            positions,
            distances,
            sigmas: vec![1.0; 4],
            weights: vec![1.0; 4],
            quality: vec![1.0; 4],
            source_of: vec![0; 4],
            by_source: vec![vec![0, 1, 2, 3]],
        };
        let err = covariance_on_inliers(&data, &[true; 4], &truth).expect_err("degenerate");
        assert_eq!(err, EstimateError::CovarianceNotPositiveDefinite);
    }
}
