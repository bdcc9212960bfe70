//! Levenberg-Marquardt refinement of a lateration solution.

use nalgebra::{Const, DimMin, SMatrix, SVector};

use super::RangeProblem;
use crate::error::SolveError;
use crate::model::Point;

const INITIAL_LAMBDA: f64 = 1e-3;
const LAMBDA_DECREASE: f64 = 0.3;
const LAMBDA_INCREASE: f64 = 4.0;
const LAMBDA_MAX: f64 = 1e12;
const STEP_TOLERANCE: f64 = 1e-12;
const COST_TOLERANCE: f64 = 1e-14;

/// Weighted squared range cost and its Gauss-Newton normal equations at `x`.
struct NormalEquations<const D: usize> {
    jtj: SMatrix<f64, D, D>,
    jtr: SVector<f64, D>,
    cost: f64,
}

fn normal_equations<const D: usize>(
    problem: &RangeProblem<D>,
    x: &Point<D>,
) -> NormalEquations<D> {
    let mut jtj = SMatrix::<f64, D, D>::zeros();
    let mut jtr = SVector::<f64, D>::zeros();
    let mut cost = 0.0;

    for i in 0..problem.len() {
        let w = problem.weights[i].max(0.0);
        let delta = x - problem.positions[i];
        let range = delta.norm();
        let residual = range - problem.distances[i];
        cost += w * residual * residual;
        if range < 1e-12 {
            // Receiver on top of a source: the residual gradient is
            // undefined, keep the cost contribution and skip the row.
            continue;
        }
        let u = delta / range;
        jtj += w * u * u.transpose();
        jtr += (w * residual) * u;
    }

    NormalEquations { jtj, jtr, cost }
}

fn weighted_cost<const D: usize>(problem: &RangeProblem<D>, x: &Point<D>) -> f64 {
    let mut cost = 0.0;
    for i in 0..problem.len() {
        let residual = (x - problem.positions[i]).norm() - problem.distances[i];
        cost += problem.weights[i].max(0.0) * residual * residual;
    }
    cost
}

/// Minimize the weighted squared range residuals starting from `seed`.
///
/// Classic Levenberg-Marquardt with multiplicative damping: a rejected step
/// raises the damping and retries within the same iteration; runaway damping
/// or non-finite values are a solve failure. Exhausting `max_iterations`
/// returns the best position reached so far.
pub(crate) fn solve_nonlinear<const D: usize>(
    problem: &RangeProblem<D>,
    seed: Point<D>,
    max_iterations: usize,
) -> Result<Point<D>, SolveError>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    if problem.len() < D + 1 {
        return Err(SolveError::TooFewReadings {
            needed: D + 1,
            got: problem.len(),
        });
    }
    if !seed.iter().all(|c| c.is_finite()) {
        return Err(SolveError::DidNotConverge);
    }

    let mut x = seed;
    let mut lambda = INITIAL_LAMBDA;
    let mut eqs = normal_equations(problem, &x);
    if !eqs.cost.is_finite() {
        return Err(SolveError::DidNotConverge);
    }

    for _ in 0..max_iterations {
        let mut stepped = false;

        while lambda <= LAMBDA_MAX {
            let mut damped = eqs.jtj;
            for k in 0..D {
                let diag = damped[(k, k)];
                damped[(k, k)] = if diag > 0.0 {
                    diag * (1.0 + lambda)
                } else {
                    lambda
                };
            }

            let Some(step) = damped.lu().solve(&(-eqs.jtr)) else {
                lambda *= LAMBDA_INCREASE;
                continue;
            };

            let candidate = x + step;
            let candidate_cost = weighted_cost(problem, &candidate);
            if candidate_cost.is_finite() && candidate_cost <= eqs.cost {
                let converged = step.norm() < STEP_TOLERANCE * (1.0 + x.norm())
                    || (eqs.cost - candidate_cost) < COST_TOLERANCE * (1.0 + eqs.cost);
                x = candidate;
                lambda = (lambda * LAMBDA_DECREASE).max(1e-12);
                eqs = normal_equations(problem, &x);
                if converged {
                    return Ok(x);
                }
                stepped = true;
                break;
            }
            lambda *= LAMBDA_INCREASE;
        }

        if !stepped {
            // Damping exhausted without an acceptable step; the current
            // point is a (possibly local) minimum of the damped model.
            return if eqs.cost.is_finite() {
                Ok(x)
            } else {
                Err(SolveError::DidNotConverge)
            };
        }
    }

    Ok(x)
}
