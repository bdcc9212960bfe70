//! Robust position estimator: configuration surface, state machine, lock
//! discipline and the estimate pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

use crate::consensus::{self, ConsensusParams, EngineEvent, RobustMethod};
use crate::error::EstimateError;
use crate::model::{Fingerprint, Point, RadioSource, ReadingSet};
use crate::refine;
use crate::solver;

const DEFAULT_THRESHOLD: f64 = 1.0;
const DEFAULT_STOP_THRESHOLD: f64 = 1e-3;
const DEFAULT_CONFIDENCE: f64 = 0.99;
const DEFAULT_MAX_ITERATIONS: usize = 5000;
const DEFAULT_PROGRESS_DELTA: f32 = 0.05;
const DEFAULT_FALLBACK_DISTANCE_STD: f64 = 1.0;
const DEFAULT_SEED: u64 = 42;

/// Lifecycle of an estimator instance.
///
/// Mutating inputs while idle re-derives `Idle`/`Ready`; `Running` locks the
/// instance for the duration of one `estimate()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorState {
    /// Inputs incomplete: estimation cannot start.
    Idle,
    /// Sources and fingerprint satisfy the readiness conditions.
    Ready,
    /// An estimation is executing; every mutator fails with a locking error.
    Running,
    /// The last estimation produced a result.
    Succeeded,
    /// The last estimation failed.
    Failed,
}

/// Synchronous lifecycle notifications, delivered on the calling thread.
///
/// Callbacks receive the estimator itself; attempts to mutate it from a
/// callback hit the same lock check as any other mutation while running.
pub trait EstimatorListener<const D: usize> {
    /// Estimation entered the running state.
    fn on_estimate_start(&mut self, _estimator: &mut PositionEstimator<D>) {}
    /// Estimation left the running state (success or failure).
    fn on_estimate_end(&mut self, _estimator: &mut PositionEstimator<D>) {}
    /// A hypothesis replaced the running best at the given iteration.
    fn on_new_best_found(&mut self, _estimator: &mut PositionEstimator<D>, _iteration: usize) {}
    /// Cumulative iteration fraction crossed the configured progress delta.
    fn on_progress(&mut self, _estimator: &mut PositionEstimator<D>, _progress: f32) {}
}

/// Shared handle for a registered listener.
pub type ListenerHandle<const D: usize> = Rc<RefCell<dyn EstimatorListener<D>>>;

/// Inlier bookkeeping of the winning hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InliersData {
    /// Inlier flag per matched reading, in fingerprint order.
    pub inliers: Vec<bool>,
    /// Number of inliers.
    pub n_inliers: usize,
    /// Absolute residual per matched reading, when kept.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub residuals: Option<Vec<f64>>,
    /// Inlier threshold actually applied (configured, or derived from the
    /// residual median for the median-based variants).
    pub threshold: f64,
}

/// Final output of one `estimate()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult<const D: usize> {
    /// Estimated receiver position.
    pub position: Point<D>,
    /// Covariance of the estimate, when kept.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub covariance: Option<SMatrix<f64, D, D>>,
    /// Winning inlier set, when kept.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inliers: Option<InliersData>,
    /// Consensus iterations performed.
    pub iterations: usize,
}

/// Robust single-shot position estimator over one fingerprint snapshot.
///
/// Configure through the setters (all of which fail with
/// [`EstimateError::Locked`] while an estimation runs), then call
/// [`estimate`](Self::estimate). The five consensus variants share this one
/// type; [`RobustMethod`] selects the scoring/sampling strategy.
pub struct PositionEstimator<const D: usize> {
    method: RobustMethod,

    sources: Option<Vec<RadioSource<D>>>,
    fingerprint: Option<Fingerprint>,
    source_quality_scores: Option<Vec<f64>>,
    reading_quality_scores: Option<Vec<f64>>,
    initial_position: Option<Point<D>>,
    listener: Option<ListenerHandle<D>>,

    preliminary_subset_size: usize,
    threshold: f64,
    stop_threshold: f64,
    confidence: f64,
    max_iterations: usize,
    progress_delta: f32,
    seed: u64,
    fallback_distance_standard_deviation: f64,
    radio_source_position_covariance_used: bool,
    evenly_distribute_readings: bool,
    result_refined: bool,
    covariance_kept: bool,
    linear_solver_used: bool,
    homogeneous_linear_solver_used: bool,
    preliminary_solution_refined: bool,
    compute_and_keep_inliers: bool,
    compute_and_keep_residuals: bool,

    state: EstimatorState,
    data: Option<ReadingSet<D>>,
    estimated_position: Option<Point<D>>,
    covariance: Option<SMatrix<f64, D, D>>,
    inliers_data: Option<InliersData>,
    iterations: usize,
}

impl<const D: usize> PositionEstimator<D> {
    /// Estimator for the given consensus variant with default configuration.
    pub fn new(method: RobustMethod) -> Self {
        Self {
            method,
            sources: None,
            fingerprint: None,
            source_quality_scores: None,
            reading_quality_scores: None,
            initial_position: None,
            listener: None,
            preliminary_subset_size: solver::min_readings(D, true, false),
            threshold: DEFAULT_THRESHOLD,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            confidence: DEFAULT_CONFIDENCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress_delta: DEFAULT_PROGRESS_DELTA,
            seed: DEFAULT_SEED,
            fallback_distance_standard_deviation: DEFAULT_FALLBACK_DISTANCE_STD,
            radio_source_position_covariance_used: false,
            evenly_distribute_readings: true,
            result_refined: true,
            covariance_kept: true,
            linear_solver_used: true,
            homogeneous_linear_solver_used: false,
            preliminary_solution_refined: false,
            compute_and_keep_inliers: true,
            compute_and_keep_residuals: true,
            state: EstimatorState::Idle,
            data: None,
            estimated_position: None,
            covariance: None,
            inliers_data: None,
            iterations: 0,
        }
    }

    /// Estimator with inputs set and the method picked by quality-score
    /// availability: the prioritized PROMedS variant when scores are given,
    /// LMedS otherwise.
    pub fn with_default_method(
        sources: Vec<RadioSource<D>>,
        fingerprint: Fingerprint,
        source_quality_scores: Option<Vec<f64>>,
        reading_quality_scores: Option<Vec<f64>>,
    ) -> Result<Self, EstimateError> {
        let has_scores = source_quality_scores.is_some() || reading_quality_scores.is_some();
        let mut estimator = Self::new(RobustMethod::default_for(has_scores));
        estimator.set_sources(sources)?;
        estimator.set_fingerprint(fingerprint)?;
        estimator.set_source_quality_scores(source_quality_scores)?;
        estimator.set_fingerprint_reading_quality_scores(reading_quality_scores)?;
        Ok(estimator)
    }

    // ── Read-only surface ──────────────────────────────────────────────

    /// Which consensus variant this estimator runs.
    pub fn method(&self) -> RobustMethod {
        self.method
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Whether sources and fingerprint satisfy the readiness conditions.
    pub fn is_ready(&self) -> bool {
        self.readiness()
    }

    /// Whether an estimation is currently running.
    pub fn is_locked(&self) -> bool {
        self.state == EstimatorState::Running
    }

    /// Dimensionality of the estimation space.
    pub fn number_of_dimensions(&self) -> usize {
        D
    }

    /// Minimum number of distinct sources the current solver mode needs.
    pub fn min_required_sources(&self) -> usize {
        solver::min_readings(
            D,
            self.linear_solver_used,
            self.homogeneous_linear_solver_used,
        )
    }

    /// Configured sources.
    pub fn sources(&self) -> Option<&[RadioSource<D>]> {
        self.sources.as_deref()
    }

    /// Configured fingerprint.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Source positions per matched reading, in fingerprint order.
    pub fn positions(&self) -> Option<&[Point<D>]> {
        self.data.as_ref().map(|d| d.positions.as_slice())
    }

    /// Measured distances per matched reading, in fingerprint order.
    pub fn distances(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| d.distances.as_slice())
    }

    /// Distance standard deviations per matched reading (fallback applied),
    /// in fingerprint order.
    pub fn distance_standard_deviations(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| d.sigmas.as_slice())
    }

    /// Position estimated by the last successful run.
    pub fn estimated_position(&self) -> Option<&Point<D>> {
        self.estimated_position.as_ref()
    }

    /// Covariance of the last estimate, when kept.
    pub fn covariance(&self) -> Option<&SMatrix<f64, D, D>> {
        self.covariance.as_ref()
    }

    /// Inlier data of the last estimate, when kept.
    pub fn inliers_data(&self) -> Option<&InliersData> {
        self.inliers_data.as_ref()
    }

    /// Consensus iterations performed by the last run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Configured preliminary subset size.
    pub fn preliminary_subset_size(&self) -> usize {
        self.preliminary_subset_size
    }

    /// Configured inlier threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Configured confidence.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Configured iteration cap.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    // ── Mutators (all rejected while running) ──────────────────────────

    /// Set the radio sources. Requires at least
    /// [`min_required_sources`](Self::min_required_sources) entries.
    pub fn set_sources(&mut self, sources: Vec<RadioSource<D>>) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        let needed = self.min_required_sources();
        if sources.len() < needed {
            return Err(EstimateError::TooFewSources {
                needed,
                got: sources.len(),
            });
        }
        if self
            .source_quality_scores
            .as_ref()
            .is_some_and(|s| s.len() != sources.len())
        {
            tracing::debug!("source quality scores no longer match, dropping them");
            self.source_quality_scores = None;
        }
        self.sources = Some(sources);
        self.refresh();
        Ok(())
    }

    /// Set the fingerprint. Requires at least
    /// [`min_required_sources`](Self::min_required_sources) readings.
    pub fn set_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        let needed = self.min_required_sources();
        if fingerprint.len() < needed {
            return Err(EstimateError::TooFewReadings {
                needed,
                got: fingerprint.len(),
            });
        }
        if self
            .reading_quality_scores
            .as_ref()
            .is_some_and(|s| s.len() != fingerprint.len())
        {
            tracing::debug!("reading quality scores no longer match, dropping them");
            self.reading_quality_scores = None;
        }
        self.fingerprint = Some(fingerprint);
        self.refresh();
        Ok(())
    }

    /// Register (or clear) the lifecycle listener.
    pub fn set_listener(&mut self, listener: Option<ListenerHandle<D>>) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    /// Seed position for the nonlinear solver; when absent the linear
    /// solution seeds it.
    pub fn set_initial_position(
        &mut self,
        position: Option<Point<D>>,
    ) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.initial_position = position;
        Ok(())
    }

    /// Size of the minimal subsets drawn per iteration. Must be at least
    /// the solver minimum for the current dimensionality and mode.
    pub fn set_preliminary_subset_size(&mut self, size: usize) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        let minimum = self.min_required_sources();
        if size < minimum {
            return Err(EstimateError::SubsetSizeTooSmall { minimum, got: size });
        }
        self.preliminary_subset_size = size;
        self.refresh();
        Ok(())
    }

    /// Inlier threshold for the fixed-threshold variants. Must be positive.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(EstimateError::InvalidConfigValue {
                name: "threshold",
                reason: "must be a positive finite number",
            });
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Early-stop residual level for the median-based variants. Must be
    /// positive.
    pub fn set_stop_threshold(&mut self, stop_threshold: f64) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if !(stop_threshold.is_finite() && stop_threshold > 0.0) {
            return Err(EstimateError::InvalidConfigValue {
                name: "stop_threshold",
                reason: "must be a positive finite number",
            });
        }
        self.stop_threshold = stop_threshold;
        Ok(())
    }

    /// Probability that the adaptive budget finds an all-inlier subset.
    /// Must lie strictly inside (0, 1).
    pub fn set_confidence(&mut self, confidence: f64) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if !(confidence.is_finite() && confidence > 0.0 && confidence < 1.0) {
            return Err(EstimateError::InvalidConfigValue {
                name: "confidence",
                reason: "must lie strictly inside (0, 1)",
            });
        }
        self.confidence = confidence;
        Ok(())
    }

    /// Hard cap on consensus iterations. Must be at least one.
    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if max_iterations == 0 {
            return Err(EstimateError::InvalidConfigValue {
                name: "max_iterations",
                reason: "must be at least 1",
            });
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    /// Progress notification granularity in [0, 1].
    pub fn set_progress_delta(&mut self, progress_delta: f32) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if !(progress_delta.is_finite() && (0.0..=1.0).contains(&progress_delta)) {
            return Err(EstimateError::InvalidConfigValue {
                name: "progress_delta",
                reason: "must lie in [0, 1]",
            });
        }
        self.progress_delta = progress_delta;
        Ok(())
    }

    /// Standard deviation applied to readings that lack one. Must be
    /// positive.
    pub fn set_fallback_distance_standard_deviation(
        &mut self,
        sigma: f64,
    ) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(EstimateError::InvalidConfigValue {
                name: "fallback_distance_standard_deviation",
                reason: "must be a positive finite number",
            });
        }
        self.fallback_distance_standard_deviation = sigma;
        self.refresh();
        Ok(())
    }

    /// Fold source position covariances into reading weights and the final
    /// covariance.
    pub fn set_radio_source_position_covariance_used(
        &mut self,
        used: bool,
    ) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.radio_source_position_covariance_used = used;
        self.refresh();
        Ok(())
    }

    /// Spread subset draws across distinct sources before allowing repeats.
    pub fn set_evenly_distribute_readings(&mut self, evenly: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.evenly_distribute_readings = evenly;
        Ok(())
    }

    /// Re-solve over the winning inlier set after consensus.
    pub fn set_result_refined(&mut self, refined: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.result_refined = refined;
        Ok(())
    }

    /// Compute and keep the covariance of the estimate.
    pub fn set_covariance_kept(&mut self, kept: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.covariance_kept = kept;
        Ok(())
    }

    /// Solve minimal subsets with the closed-form linear solver.
    pub fn set_linear_solver_used(&mut self, used: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.linear_solver_used = used;
        self.clamp_subset_size_to_minimum();
        self.refresh();
        Ok(())
    }

    /// Use the homogeneous formulation of the linear solver (raises the
    /// minimal subset size by one).
    pub fn set_homogeneous_linear_solver_used(&mut self, used: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.homogeneous_linear_solver_used = used;
        self.clamp_subset_size_to_minimum();
        self.refresh();
        Ok(())
    }

    /// Polish each preliminary subset solution with the nonlinear solver.
    pub fn set_preliminary_solution_refined(&mut self, refined: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.preliminary_solution_refined = refined;
        Ok(())
    }

    /// Keep the winning inlier flags on the result.
    pub fn set_compute_and_keep_inliers(&mut self, keep: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.compute_and_keep_inliers = keep;
        Ok(())
    }

    /// Keep the winning residuals on the result.
    pub fn set_compute_and_keep_residuals(&mut self, keep: bool) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.compute_and_keep_residuals = keep;
        Ok(())
    }

    /// Per-source quality scores for the prioritized variants. Length must
    /// match the source list; non-prioritized variants accept and ignore
    /// them.
    pub fn set_source_quality_scores(
        &mut self,
        scores: Option<Vec<f64>>,
    ) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if let Some(scores) = &scores {
            let expected = self.sources.as_ref().map_or(0, |s| s.len());
            if scores.len() != expected {
                return Err(EstimateError::QualityScoreLengthMismatch {
                    expected,
                    got: scores.len(),
                });
            }
        }
        self.source_quality_scores = scores;
        self.refresh();
        Ok(())
    }

    /// Per-reading quality scores for the prioritized variants. Length must
    /// match the fingerprint; non-prioritized variants accept and ignore
    /// them.
    pub fn set_fingerprint_reading_quality_scores(
        &mut self,
        scores: Option<Vec<f64>>,
    ) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        if let Some(scores) = &scores {
            let expected = self.fingerprint.as_ref().map_or(0, |f| f.len());
            if scores.len() != expected {
                return Err(EstimateError::QualityScoreLengthMismatch {
                    expected,
                    got: scores.len(),
                });
            }
        }
        self.reading_quality_scores = scores;
        self.refresh();
        Ok(())
    }

    /// Seed of the subset-sampling RNG (fixed default for reproducibility).
    pub fn set_seed(&mut self, seed: u64) -> Result<(), EstimateError> {
        self.ensure_unlocked()?;
        self.seed = seed;
        Ok(())
    }

    // ── Estimation ─────────────────────────────────────────────────────

    /// Run the configured robust estimation.
    ///
    /// Locks the instance for the duration of the call; the lock is
    /// released on every return path. Fails fast with
    /// [`EstimateError::NotReady`] before locking when inputs are missing.
    pub fn estimate(&mut self) -> Result<EstimateResult<D>, EstimateError>
    where
        nalgebra::Const<D>: nalgebra::DimMin<nalgebra::Const<D>, Output = nalgebra::Const<D>>,
    {
        self.ensure_unlocked()?;
        if !self.readiness() {
            return Err(EstimateError::NotReady);
        }

        self.estimated_position = None;
        self.covariance = None;
        self.inliers_data = None;
        self.iterations = 0;
        self.state = EstimatorState::Running;
        tracing::info!(
            method = %self.method,
            readings = self.data.as_ref().map_or(0, |d| d.len()),
            subset_size = self.preliminary_subset_size,
            "estimation started"
        );
        self.notify(|listener, estimator| listener.on_estimate_start(estimator));

        let outcome = self.run_pipeline();

        self.state = match &outcome {
            Ok(_) => EstimatorState::Succeeded,
            Err(_) => EstimatorState::Failed,
        };
        match &outcome {
            Ok(result) => tracing::info!(
                iterations = result.iterations,
                n_inliers = result.inliers.as_ref().map_or(0, |i| i.n_inliers),
                "estimation succeeded"
            ),
            Err(err) => tracing::warn!(%err, "estimation failed"),
        }
        self.notify(|listener, estimator| listener.on_estimate_end(estimator));
        outcome
    }

    fn run_pipeline(&mut self) -> Result<EstimateResult<D>, EstimateError>
    where
        nalgebra::Const<D>: nalgebra::DimMin<nalgebra::Const<D>, Output = nalgebra::Const<D>>,
    {
        let data = self.data.clone().ok_or(EstimateError::NotReady)?;
        let params = ConsensusParams {
            method: self.method,
            subset_size: self.preliminary_subset_size,
            threshold: self.threshold,
            stop_threshold: self.stop_threshold,
            confidence: self.confidence,
            max_iterations: self.max_iterations,
            progress_delta: self.progress_delta,
            evenly_distribute: self.evenly_distribute_readings,
            seed: self.seed,
        };
        let linear = self.linear_solver_used;
        let homogeneous = self.homogeneous_linear_solver_used;
        let refine_preliminary = self.preliminary_solution_refined;
        let initial = self.initial_position;

        let solve = |subset: &[usize]| {
            solver::solve_subset(&data, subset, linear, homogeneous, refine_preliminary, initial)
        };
        let mut on_event = |event: EngineEvent| match event {
            EngineEvent::NewBest { iteration } => {
                self.notify(|listener, estimator| listener.on_new_best_found(estimator, iteration));
            }
            EngineEvent::Progress { fraction } => {
                self.notify(|listener, estimator| listener.on_progress(estimator, fraction));
            }
        };

        let outcome = consensus::run(&data, &params, &solve, &mut on_event)?;
        self.iterations = outcome.iterations;
        tracing::debug!(
            iterations = outcome.iterations,
            best_iteration = outcome.best_iteration,
            n_inliers = outcome.n_inliers,
            "consensus finished"
        );

        let mut position = outcome.position;
        if self.result_refined {
            if outcome.n_inliers >= D + 1 {
                match refine::refine_on_inliers(&data, &outcome.inliers, position) {
                    Ok(refined) => position = refined,
                    Err(err) => {
                        tracing::warn!(%err, "inlier refinement failed, keeping consensus solution");
                    }
                }
            } else {
                tracing::warn!(
                    n_inliers = outcome.n_inliers,
                    "too few inliers to refine, keeping consensus solution"
                );
            }
        }

        let covariance = if self.covariance_kept {
            Some(refine::covariance_on_inliers(
                &data,
                &outcome.inliers,
                &position,
            )?)
        } else {
            None
        };

        let inliers_data = self.compute_and_keep_inliers.then(|| InliersData {
            inliers: outcome.inliers.clone(),
            n_inliers: outcome.n_inliers,
            residuals: self
                .compute_and_keep_residuals
                .then(|| outcome.residuals.clone()),
            threshold: outcome.threshold,
        });

        self.estimated_position = Some(position);
        self.covariance = covariance;
        self.inliers_data = inliers_data.clone();

        Ok(EstimateResult {
            position,
            covariance,
            inliers: inliers_data,
            iterations: outcome.iterations,
        })
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn ensure_unlocked(&self) -> Result<(), EstimateError> {
        if self.is_locked() {
            Err(EstimateError::Locked)
        } else {
            Ok(())
        }
    }

    fn clamp_subset_size_to_minimum(&mut self) {
        let minimum = self.min_required_sources();
        if self.preliminary_subset_size < minimum {
            tracing::debug!(
                from = self.preliminary_subset_size,
                to = minimum,
                "raising preliminary subset size to the solver minimum"
            );
            self.preliminary_subset_size = minimum;
        }
    }

    /// Rebuild the flattened reading set and re-derive the idle/ready state.
    fn refresh(&mut self) {
        self.data = match (&self.sources, &self.fingerprint) {
            (Some(sources), Some(fingerprint)) => Some(ReadingSet::build(
                sources,
                fingerprint,
                self.fallback_distance_standard_deviation,
                self.radio_source_position_covariance_used,
                self.source_quality_scores.as_deref(),
                self.reading_quality_scores.as_deref(),
            )),
            _ => None,
        };
        if self.state != EstimatorState::Running {
            self.state = if self.readiness() {
                EstimatorState::Ready
            } else {
                EstimatorState::Idle
            };
        }
    }

    fn readiness(&self) -> bool {
        let Some(data) = &self.data else {
            return false;
        };
        data.len() >= self.preliminary_subset_size
            && data.distinct_sources() >= self.min_required_sources()
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn EstimatorListener<D>, &mut Self)) {
        if let Some(listener) = self.listener.clone() {
            f(&mut *listener.borrow_mut(), self);
        }
    }
}

impl<const D: usize> std::fmt::Debug for PositionEstimator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionEstimator")
            .field("method", &self.method)
            .field("state", &self.state)
            .field("dimensions", &D)
            .field("sources", &self.sources.as_ref().map(|s| s.len()))
            .field("readings", &self.fingerprint.as_ref().map(|fp| fp.len()))
            .field("subset_size", &self.preliminary_subset_size)
            .finish_non_exhaustive()
    }
}
