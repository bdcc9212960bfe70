//! Lateration solver: position from (source position, distance, weight)
//! tuples.
//!
//! Two solving modes share one contract: map a tuple list of at least the
//! minimal subset size into exactly one position, or report a per-call
//! failure the consensus engine treats as "this subset is unusable".
//!
//! - **Linear**: closed-form weighted least squares, either inhomogeneous
//!   (reference-reading differences, needs D+1 readings) or homogeneous
//!   (null-space of the lifted system, needs D+2 readings).
//! - **Nonlinear**: Levenberg-Marquardt on weighted range residuals, seeded
//!   by a caller-supplied position or the inhomogeneous linear solution.

mod linear;
mod nonlinear;

pub(crate) use self::linear::{solve_homogeneous, solve_inhomogeneous};
pub(crate) use self::nonlinear::solve_nonlinear;

use crate::error::SolveError;
use crate::model::{Point, ReadingSet};

/// Maximum Levenberg-Marquardt iterations per solve.
pub(crate) const NONLINEAR_MAX_ITERATIONS: usize = 50;

/// Minimal number of readings for the given dimensionality and linear mode.
pub(crate) const fn min_readings(dimensions: usize, linear: bool, homogeneous: bool) -> usize {
    if linear && homogeneous {
        dimensions + 2
    } else {
        dimensions + 1
    }
}

/// A lateration problem over an owned tuple list.
#[derive(Debug, Clone)]
pub(crate) struct RangeProblem<const D: usize> {
    pub positions: Vec<Point<D>>,
    pub distances: Vec<f64>,
    pub weights: Vec<f64>,
}

impl<const D: usize> RangeProblem<D> {
    /// Gather the tuples for a subset of reading indices.
    pub(crate) fn from_indices(data: &ReadingSet<D>, subset: &[usize]) -> Self {
        Self {
            positions: subset.iter().map(|&i| data.positions[i]).collect(),
            distances: subset.iter().map(|&i| data.distances[i]).collect(),
            weights: subset.iter().map(|&i| data.weights[i]).collect(),
        }
    }

    /// Gather the tuples for all readings flagged as inliers.
    pub(crate) fn from_inliers(data: &ReadingSet<D>, inliers: &[bool]) -> Self {
        let indices: Vec<usize> = (0..data.len()).filter(|&i| inliers[i]).collect();
        Self::from_indices(data, &indices)
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Solve one minimal subset under the configured solver flags.
///
/// With the linear solver enabled the subset is solved in closed form and
/// optionally polished by the nonlinear solver (`refine_preliminary`).
/// Otherwise the nonlinear solver runs directly, seeded by the caller's
/// initial position or the inhomogeneous linear solution.
pub(crate) fn solve_subset<const D: usize>(
    data: &ReadingSet<D>,
    subset: &[usize],
    linear: bool,
    homogeneous: bool,
    refine_preliminary: bool,
    initial: Option<Point<D>>,
) -> Result<Point<D>, SolveError>
where
    nalgebra::Const<D>: nalgebra::DimMin<nalgebra::Const<D>, Output = nalgebra::Const<D>>,
{
    let problem = RangeProblem::from_indices(data, subset);

    if linear {
        let position = if homogeneous {
            solve_homogeneous(&problem)?
        } else {
            solve_inhomogeneous(&problem)?
        };
        if refine_preliminary {
            match solve_nonlinear(&problem, position, NONLINEAR_MAX_ITERATIONS) {
                Ok(refined) => return Ok(refined),
                Err(err) => {
                    tracing::trace!(%err, "preliminary refinement failed, keeping linear solution");
                    return Ok(position);
                }
            }
        }
        return Ok(position);
    }

    let seed = match initial {
        Some(seed) => seed,
        None => solve_inhomogeneous(&problem)?,
    };
    solve_nonlinear(&problem, seed, NONLINEAR_MAX_ITERATIONS)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Exact problem: sources at the given positions, distances measured
    /// from `truth`, unit weights.
    pub(crate) fn exact_problem<const D: usize>(
        positions: Vec<Point<D>>,
        truth: &Point<D>,
    ) -> RangeProblem<D> {
        let distances = positions.iter().map(|p| (truth - p).norm()).collect();
        let weights = vec![1.0; positions.len()];
        RangeProblem {
            positions,
            distances,
            weights,
        }
    }
}
