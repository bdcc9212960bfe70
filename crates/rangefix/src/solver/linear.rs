//! Closed-form linear lateration via weighted least squares.

use nalgebra::{DMatrix, DVector};

use super::RangeProblem;
use crate::error::SolveError;
use crate::model::Point;

/// Relative cutoff below which singular values count as zero.
const RANK_EPS: f64 = 1e-10;

/// Inhomogeneous linear solve.
///
/// Subtracting the reference reading's sphere equation from every other
/// reading's yields one linear equation per remaining reading:
///
/// `2 (p_i - p_0)ᵀ x = d_0² - d_i² + |p_i|² - |p_0|²`
///
/// Requires `D + 1` readings; each row is scaled by the square root of its
/// reading weight.
pub(crate) fn solve_inhomogeneous<const D: usize>(
    problem: &RangeProblem<D>,
) -> Result<Point<D>, SolveError> {
    let n = problem.len();
    if n < D + 1 {
        return Err(SolveError::TooFewReadings {
            needed: D + 1,
            got: n,
        });
    }

    let p0 = &problem.positions[0];
    let d0 = problem.distances[0];
    let rows = n - 1;

    let mut a = DMatrix::<f64>::zeros(rows, D);
    let mut b = DVector::<f64>::zeros(rows);
    for i in 1..n {
        let pi = &problem.positions[i];
        let di = problem.distances[i];
        let w = problem.weights[i].max(0.0).sqrt();
        for k in 0..D {
            a[(i - 1, k)] = 2.0 * (pi[k] - p0[k]) * w;
        }
        b[i - 1] = (d0 * d0 - di * di + pi.norm_squared() - p0.norm_squared()) * w;
    }

    solve_least_squares(a, b)
}

/// Homogeneous linear solve.
///
/// Each reading contributes a row of the lifted system
/// `[1, -2 p_iᵀ, |p_i|² - d_i²] · [|x|², x, 1]ᵀ = 0`; the solution is the
/// right singular vector of the smallest singular value, dehomogenized by
/// its last component. Requires `D + 2` readings.
pub(crate) fn solve_homogeneous<const D: usize>(
    problem: &RangeProblem<D>,
) -> Result<Point<D>, SolveError> {
    let n = problem.len();
    if n < D + 2 {
        return Err(SolveError::TooFewReadings {
            needed: D + 2,
            got: n,
        });
    }

    let cols = D + 2;
    let mut a = DMatrix::<f64>::zeros(n, cols);
    for i in 0..n {
        let pi = &problem.positions[i];
        let di = problem.distances[i];
        let w = problem.weights[i].max(0.0).sqrt();
        a[(i, 0)] = w;
        for k in 0..D {
            a[(i, 1 + k)] = -2.0 * pi[k] * w;
        }
        a[(i, cols - 1)] = (pi.norm_squared() - di * di) * w;
    }

    let svd = a.svd(true, true);
    let v_t = svd.v_t.as_ref().ok_or(SolveError::DegenerateGeometry)?;
    let kernel = v_t.row(v_t.nrows() - 1);

    let scale = kernel[cols - 1];
    let norm = kernel.norm();
    if !scale.is_finite() || scale.abs() < RANK_EPS * norm.max(1.0) {
        return Err(SolveError::DegenerateGeometry);
    }

    let mut position = Point::<D>::zeros();
    for k in 0..D {
        position[k] = kernel[1 + k] / scale;
    }
    if !position.iter().all(|c| c.is_finite()) {
        return Err(SolveError::DegenerateGeometry);
    }
    Ok(position)
}

fn solve_least_squares<const D: usize>(
    a: DMatrix<f64>,
    b: DVector<f64>,
) -> Result<Point<D>, SolveError> {
    let svd = a.svd(true, true);
    let max_sv = svd
        .singular_values
        .iter()
        .cloned()
        .fold(0.0f64, f64::max);
    if svd.rank(RANK_EPS * max_sv.max(1.0)) < D {
        return Err(SolveError::DegenerateGeometry);
    }
    let solution = svd
        .solve(&b, RANK_EPS * max_sv.max(1.0))
        .map_err(|_| SolveError::DegenerateGeometry)?;

    let position = Point::<D>::from_iterator(solution.iter().copied());
    if !position.iter().all(|c| c.is_finite()) {
        return Err(SolveError::DegenerateGeometry);
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_support::exact_problem;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn inhomogeneous_recovers_exact_position_2d() {
        let truth = Vector2::new(2.5, -1.25);
        let problem = exact_problem(
            vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(10.0, 0.0),
                Vector2::new(0.0, 10.0),
            ],
            &truth,
        );
        let est = solve_inhomogeneous(&problem).expect("solve");
        assert_relative_eq!(est, truth, epsilon = 1e-9);
    }

    #[test]
    fn inhomogeneous_recovers_exact_position_3d() {
        let truth = Vector3::new(1.0, 2.0, 3.0);
        let problem = exact_problem(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(10.0, 0.0, 0.0),
                Vector3::new(0.0, 10.0, 0.0),
                Vector3::new(0.0, 0.0, 10.0),
            ],
            &truth,
        );
        let est = solve_inhomogeneous(&problem).expect("solve");
        assert_relative_eq!(est, truth, epsilon = 1e-9);
    }

    #[test]
    fn homogeneous_recovers_exact_position_2d() {
        let truth = Vector2::new(-3.0, 4.0);
        let problem = exact_problem(
            vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(10.0, 0.0),
                Vector2::new(0.0, 10.0),
                Vector2::new(10.0, 10.0),
            ],
            &truth,
        );
        let est = solve_homogeneous(&problem).expect("solve");
        assert_relative_eq!(est, truth, epsilon = 1e-8);
    }

    #[test]
    fn homogeneous_recovers_exact_position_3d() {
        let truth = Vector3::new(0.5, -0.5, 2.0);
        let problem = exact_problem(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(10.0, 0.0, 0.0),
                Vector3::new(0.0, 10.0, 0.0),
                Vector3::new(0.0, 0.0, 10.0),
                Vector3::new(10.0, 10.0, 10.0),
            ],
            &truth,
        );
        let est = solve_homogeneous(&problem).expect("solve");
        assert_relative_eq!(est, truth, epsilon = 1e-8);
    }

    #[test]
    fn collinear_sources_are_degenerate() {
        let truth = Vector2::new(1.0, 1.0);
        let problem = exact_problem(
            vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(5.0, 0.0),
                Vector2::new(10.0, 0.0),
            ],
            &truth,
        );
        assert_eq!(
            solve_inhomogeneous(&problem),
            Err(SolveError::DegenerateGeometry)
        );
    }

    #[test]
    fn too_few_readings_is_reported() {
        let truth = Vector2::new(1.0, 1.0);
        let problem = exact_problem(vec![Vector2::new(0.0, 0.0), Vector2::new(5.0, 0.0)], &truth);
        assert_eq!(
            solve_inhomogeneous(&problem),
            Err(SolveError::TooFewReadings { needed: 3, got: 2 })
        );
        assert_eq!(
            solve_homogeneous(&problem),
            Err(SolveError::TooFewReadings { needed: 4, got: 2 })
        );
    }

    #[test]
    fn weights_bias_the_solution_toward_trusted_readings() {
        // Two conflicting distance sets; the heavily weighted readings win.
        let truth = Vector2::new(3.0, 3.0);
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 0.0),
            Vector2::new(0.0, 10.0),
            Vector2::new(10.0, 10.0),
        ];
        let mut problem = exact_problem(positions, &truth);
        // Corrupt the last reading but give it negligible weight.
        problem.distances[3] += 4.0;
        problem.weights[3] = 1e-8;
        let est = solve_inhomogeneous(&problem).expect("solve");
        assert_relative_eq!(est, truth, epsilon = 1e-4);
    }
}
