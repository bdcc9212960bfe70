//! Robust sampling consensus engine.
//!
//! One control loop serves all five variants; they differ only in how
//! subsets are drawn and how hypotheses are scored:
//!
//! | method  | sampling                        | score (best)              |
//! |---------|---------------------------------|---------------------------|
//! | RANSAC  | uniform                         | inlier count (max)        |
//! | LMedS   | uniform                         | median squared (min)      |
//! | MSAC    | uniform                         | capped squared sum (min)  |
//! | PROSAC  | quality-ordered growing prefix  | prefix inlier count (max) |
//! | PROMedS | quality-weighted                | median squared (min)      |

pub(crate) mod sampling;
pub(crate) mod scoring;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EstimateError, SolveError};
use crate::model::{Point, ReadingSet};
use self::sampling::ProsacSampler;

/// Robust consensus variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobustMethod {
    /// Maximize the count of residuals below a fixed threshold.
    Ransac,
    /// Minimize the median of squared residuals; threshold derived post hoc.
    Lmeds,
    /// Minimize the sum of capped squared residuals.
    Msac,
    /// RANSAC with quality-ordered progressive sampling.
    Prosac,
    /// LMedS with quality-weighted sampling.
    Promeds,
}

impl RobustMethod {
    /// Whether the variant biases sampling by quality scores.
    pub fn is_prioritized(self) -> bool {
        matches!(self, Self::Prosac | Self::Promeds)
    }

    /// Whether the variant scores against a fixed inlier threshold (as
    /// opposed to deriving one from the residual median).
    pub fn uses_fixed_threshold(self) -> bool {
        matches!(self, Self::Ransac | Self::Msac | Self::Prosac)
    }

    /// Default method selection: the quality-prioritized variant when
    /// quality scores are available, LMedS otherwise.
    pub fn default_for(quality_scores_available: bool) -> Self {
        if quality_scores_available {
            Self::Promeds
        } else {
            Self::Lmeds
        }
    }
}

impl std::fmt::Display for RobustMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ransac => "ransac",
            Self::Lmeds => "lmeds",
            Self::Msac => "msac",
            Self::Prosac => "prosac",
            Self::Promeds => "promeds",
        };
        f.write_str(name)
    }
}

/// Parameters of one consensus run.
#[derive(Debug, Clone)]
pub(crate) struct ConsensusParams {
    pub method: RobustMethod,
    pub subset_size: usize,
    pub threshold: f64,
    pub stop_threshold: f64,
    pub confidence: f64,
    pub max_iterations: usize,
    pub progress_delta: f32,
    pub evenly_distribute: bool,
    pub seed: u64,
}

/// Events the engine reports back to the estimator mid-loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EngineEvent {
    /// A hypothesis replaced the running best.
    NewBest { iteration: usize },
    /// Cumulative iteration fraction crossed the progress delta.
    Progress { fraction: f32 },
}

/// Winning hypothesis of a consensus run.
#[derive(Debug, Clone)]
pub(crate) struct ConsensusOutcome<const D: usize> {
    pub position: Point<D>,
    /// Iteration at which the winner was found.
    pub best_iteration: usize,
    /// Iterations performed in total.
    pub iterations: usize,
    pub inliers: Vec<bool>,
    pub n_inliers: usize,
    pub residuals: Vec<f64>,
    /// Inlier threshold actually applied (configured or median-derived).
    pub threshold: f64,
}

/// Score key of a hypothesis; orientation depends on the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BestKey {
    /// Larger is better; `full` breaks ties for prefix-scored variants.
    Support { primary: usize, full: usize },
    /// Smaller is better.
    Cost(f64),
}

impl BestKey {
    fn improves(&self, incumbent: &Self) -> bool {
        match (self, incumbent) {
            (
                Self::Support { primary, full },
                Self::Support {
                    primary: other,
                    full: other_full,
                },
            ) => primary > other || (primary == other && full > other_full),
            (Self::Cost(cost), Self::Cost(other)) => cost < other,
            _ => {
                debug_assert!(false, "mixed score keys");
                false
            }
        }
    }
}

struct BestHypothesis<const D: usize> {
    position: Point<D>,
    key: BestKey,
    residuals: Vec<f64>,
    inliers: Vec<bool>,
    n_inliers: usize,
    threshold: f64,
    iteration: usize,
}

/// Iterations needed to draw an all-inlier subset with the requested
/// confidence, given the observed inlier ratio.
fn adaptive_max_iterations(
    inlier_ratio: f64,
    confidence: f64,
    subset_size: usize,
    cap: usize,
) -> usize {
    if inlier_ratio <= 0.0 {
        return cap;
    }
    let p_subset = inlier_ratio.min(1.0).powi(subset_size as i32);
    if p_subset >= 1.0 {
        return 1;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - p_subset).ln();
    if !needed.is_finite() || needed >= cap as f64 {
        cap
    } else {
        (needed.ceil() as usize).max(1)
    }
}

/// Run the consensus loop.
///
/// `solve_subset` maps a subset of reading indices to a candidate position;
/// its failures mark the subset as unusable without aborting the loop (they
/// still consume iteration budget).
pub(crate) fn run<const D: usize>(
    data: &ReadingSet<D>,
    params: &ConsensusParams,
    solve_subset: &dyn Fn(&[usize]) -> Result<Point<D>, SolveError>,
    on_event: &mut dyn FnMut(EngineEvent),
) -> Result<ConsensusOutcome<D>, EstimateError> {
    let n = data.len();
    let m = params.subset_size;
    debug_assert!(m <= n);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut prosac = matches!(params.method, RobustMethod::Prosac)
        .then(|| ProsacSampler::new(&data.quality, m));

    let mut best: Option<BestHypothesis<D>> = None;
    let mut adaptive_cap = params.max_iterations;
    let mut last_solve_error: Option<SolveError> = None;
    let mut last_progress = 0.0f32;
    let mut iterations = 0usize;

    for iteration in 0..params.max_iterations {
        if iteration >= adaptive_cap {
            break;
        }
        iterations = iteration + 1;

        let subset = match (&mut prosac, params.method) {
            (Some(sampler), _) => sampler.next_subset(&mut rng),
            (None, RobustMethod::Promeds) => {
                sampling::sample_quality_weighted(&mut rng, &data.quality, m)
            }
            (None, _) if params.evenly_distribute => {
                sampling::sample_evenly_across_sources(&mut rng, &data.by_source, n, m)
            }
            (None, _) => sampling::sample_distinct(&mut rng, n, m),
        };

        let candidate = match solve_subset(&subset) {
            Ok(position) => position,
            Err(err) => {
                tracing::trace!(iteration, %err, "subset solve failed");
                last_solve_error = Some(err);
                emit_progress(
                    iterations,
                    params,
                    adaptive_cap,
                    &mut last_progress,
                    on_event,
                );
                continue;
            }
        };

        let residuals = scoring::residuals(&candidate, &data.positions, &data.distances);
        let (key, median_sq) = score(params, &residuals, prosac.as_ref());

        if best.as_ref().map_or(true, |b| key.improves(&b.key)) {
            let threshold = if params.method.uses_fixed_threshold() {
                params.threshold
            } else {
                // Floored at the stop level: residuals good enough to stop
                // the search are inliers by definition.
                scoring::lmeds_threshold(median_sq, n, m).max(params.stop_threshold)
            };
            let (inliers, n_inliers) = scoring::flag_inliers(&residuals, threshold);

            adaptive_cap = adaptive_max_iterations(
                n_inliers as f64 / n as f64,
                params.confidence,
                m,
                params.max_iterations,
            );

            tracing::debug!(iteration, n_inliers, threshold, "new best hypothesis");
            let stop = if params.method.uses_fixed_threshold() {
                n_inliers == n
            } else {
                median_sq.sqrt() <= params.stop_threshold
            };
            best = Some(BestHypothesis {
                position: candidate,
                key,
                residuals,
                inliers,
                n_inliers,
                threshold,
                iteration,
            });
            on_event(EngineEvent::NewBest { iteration });
            if stop {
                break;
            }
        }

        emit_progress(
            iterations,
            params,
            adaptive_cap,
            &mut last_progress,
            on_event,
        );
    }

    match best {
        Some(b) => Ok(ConsensusOutcome {
            position: b.position,
            best_iteration: b.iteration,
            iterations,
            inliers: b.inliers,
            n_inliers: b.n_inliers,
            residuals: b.residuals,
            threshold: b.threshold,
        }),
        None => Err(EstimateError::RobustFailure {
            iterations,
            cause: last_solve_error,
        }),
    }
}

fn score(
    params: &ConsensusParams,
    residuals: &[f64],
    prosac: Option<&ProsacSampler>,
) -> (BestKey, f64) {
    match params.method {
        RobustMethod::Ransac => {
            let count = scoring::support(residuals, params.threshold);
            (
                BestKey::Support {
                    primary: count,
                    full: count,
                },
                0.0,
            )
        }
        RobustMethod::Prosac => {
            // Consensus over the prioritized prefix, full-set support as
            // the non-prioritized fallback tie-break.
            let full = scoring::support(residuals, params.threshold);
            let primary = prosac
                .map(|s| scoring::prefix_support(residuals, s.prefix(), params.threshold))
                .unwrap_or(full);
            (BestKey::Support { primary, full }, 0.0)
        }
        RobustMethod::Msac => (
            BestKey::Cost(scoring::msac_cost(residuals, params.threshold)),
            0.0,
        ),
        RobustMethod::Lmeds | RobustMethod::Promeds => {
            let median = scoring::median_squared(residuals);
            (BestKey::Cost(median), median)
        }
    }
}

fn emit_progress(
    iterations: usize,
    params: &ConsensusParams,
    adaptive_cap: usize,
    last_progress: &mut f32,
    on_event: &mut dyn FnMut(EngineEvent),
) {
    let effective = params.max_iterations.min(adaptive_cap).max(1);
    let fraction = (iterations as f32 / effective as f32).min(1.0);
    if fraction - *last_progress >= params.progress_delta {
        *last_progress = fraction;
        on_event(EngineEvent::Progress { fraction });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn ring_data(truth: Vector2<f64>, n: usize) -> ReadingSet<2> {
        let positions: Vec<Vector2<f64>> = (0..n)
            .map(|i| {
                let theta = i as f64 * std::f64::consts::TAU / n as f64;
                Vector2::new(30.0 * theta.cos(), 30.0 * theta.sin())
            })
            .collect();
        let distances: Vec<f64> = positions.iter().map(|p| (truth - p).norm()).collect();
        ReadingSet {
            sigmas: vec![1.0; n],
            weights: vec![1.0; n],
            quality: vec![1.0; n],
            source_of: (0..n).collect(),
            by_source: (0..n).map(|i| vec![i]).collect(),
            positions,
            distances,
        }
    }

    fn params(method: RobustMethod) -> ConsensusParams {
        ConsensusParams {
            method,
            subset_size: 3,
            threshold: 0.5,
            stop_threshold: 1e-6,
            confidence: 0.99,
            max_iterations: 500,
            progress_delta: 0.05,
            evenly_distribute: false,
            seed: 42,
        }
    }

    #[test]
    fn perfect_data_converges_in_few_iterations() {
        let truth = Vector2::new(4.0, -3.0);
        let data = ring_data(truth, 10);
        let solve = |subset: &[usize]| {
            let problem = crate::solver::RangeProblem::from_indices(&data, subset);
            crate::solver::solve_inhomogeneous(&problem)
        };
        for method in [
            RobustMethod::Ransac,
            RobustMethod::Lmeds,
            RobustMethod::Msac,
            RobustMethod::Prosac,
            RobustMethod::Promeds,
        ] {
            let mut events = Vec::new();
            let outcome = run(&data, &params(method), &solve, &mut |e| events.push(e))
                .unwrap_or_else(|e| panic!("{method} failed: {e}"));
            assert!((outcome.position - truth).norm() < 1e-6, "{method}");
            assert_eq!(outcome.n_inliers, 10, "{method}");
            // All-inlier data stops the loop almost immediately.
            assert!(outcome.iterations < 20, "{method}: {}", outcome.iterations);
            assert!(events
                .iter()
                .any(|e| matches!(e, EngineEvent::NewBest { .. })));
        }
    }

    #[test]
    fn every_subset_failing_reports_robust_failure_with_cause() {
        let data = ring_data(Vector2::new(0.0, 0.0), 6);
        let solve = |_: &[usize]| Err(SolveError::DegenerateGeometry);
        let mut sink = |_: EngineEvent| {};
        let err = run(&data, &params(RobustMethod::Ransac), &solve, &mut sink)
            .expect_err("must fail");
        match err {
            EstimateError::RobustFailure { iterations, cause } => {
                assert_eq!(iterations, 500);
                assert_eq!(cause, Some(SolveError::DegenerateGeometry));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn progress_events_cross_delta_steps() {
        let data = ring_data(Vector2::new(1.0, 2.0), 8);
        // A solver that never solves keeps the loop running to the cap.
        let solve = |_: &[usize]| Err(SolveError::DegenerateGeometry);
        let mut fractions = Vec::new();
        let mut capture = |e: EngineEvent| {
            if let EngineEvent::Progress { fraction } = e {
                fractions.push(fraction);
            }
        };
        let mut p = params(RobustMethod::Msac);
        p.progress_delta = 0.25;
        let _ = run(&data, &p, &solve, &mut capture);
        assert!(fractions.len() >= 3);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn adaptive_budget_matches_closed_form() {
        assert_eq!(adaptive_max_iterations(1.0, 0.99, 3, 1000), 1);
        assert_eq!(adaptive_max_iterations(0.0, 0.99, 3, 1000), 1000);
        // 50% inliers, subsets of 3: p = 0.125, k = ln(0.01)/ln(0.875).
        let k = adaptive_max_iterations(0.5, 0.99, 3, 1000);
        assert_eq!(k, 35);
    }

    #[test]
    fn support_key_prefers_count_then_tie_break() {
        let a = BestKey::Support { primary: 5, full: 7 };
        let b = BestKey::Support { primary: 5, full: 6 };
        let c = BestKey::Support { primary: 6, full: 0 };
        assert!(a.improves(&b));
        assert!(c.improves(&a));
        assert!(!b.improves(&a));
        assert!(BestKey::Cost(1.0).improves(&BestKey::Cost(2.0)));
    }
}
