//! rangefix — robust position estimation from noisy range observations.
//!
//! Estimates the 2D or 3D position of a receiver from distance readings to
//! radio sources at known positions. Readings corrupted by non-line-of-sight
//! propagation and multipath produce gross outliers, so plain least squares
//! is not enough; the pipeline stages are:
//!
//! 1. **Model** – sources, readings and fingerprints flattened into
//!    per-reading solving arrays with 1/σ² weights.
//! 2. **Solver** – closed-form linear lateration (homogeneous or
//!    inhomogeneous) and Levenberg-Marquardt refinement over minimal
//!    subsets.
//! 3. **Consensus** – five robust variants (RANSAC, LMedS, MSAC, PROSAC,
//!    PROMedS) sharing one sampling loop with an adaptive iteration budget.
//! 4. **Refinement** – inlier-set re-solve and covariance of the estimate.
//!
//! # Public API
//! The stable surface is intentionally small:
//! - [`PositionEstimator`] as the primary entry point, parameterized by the
//!   dimensionality (`PositionEstimator<2>` or `PositionEstimator<3>`)
//! - [`RobustMethod`] to select the consensus variant
//! - [`RadioSource`], [`Reading`], [`Fingerprint`] as input model
//! - [`EstimatorListener`] for synchronous lifecycle notifications
//!
//! Solver and consensus internals are not part of the public surface.
//!
//! # Example
//! ```
//! use nalgebra::Vector2;
//! use rangefix::{Fingerprint, PositionEstimator, RadioSource, Reading, RobustMethod};
//!
//! let truth = Vector2::new(2.0, 3.0);
//! let sources: Vec<RadioSource<2>> = (0..6)
//!     .map(|i| {
//!         let theta = i as f64 * std::f64::consts::TAU / 6.0;
//!         RadioSource::new(
//!             format!("ap-{i}"),
//!             Vector2::new(20.0 * theta.cos(), 20.0 * theta.sin()),
//!         )
//!     })
//!     .collect();
//! let readings = sources
//!     .iter()
//!     .map(|s| Reading::new(s.id.clone(), (truth - s.position).norm()))
//!     .collect();
//!
//! let mut estimator = PositionEstimator::<2>::new(RobustMethod::Ransac);
//! estimator.set_sources(sources).unwrap();
//! estimator.set_fingerprint(Fingerprint::new(readings)).unwrap();
//! let result = estimator.estimate().unwrap();
//! assert!((result.position - truth).norm() < 1e-6);
//! ```

mod consensus;
mod error;
mod estimator;
mod model;
mod refine;
mod solver;
#[cfg(test)]
pub(crate) mod test_utils;

pub use consensus::RobustMethod;
pub use error::{EstimateError, SolveError};
pub use estimator::{
    EstimateResult, EstimatorListener, EstimatorState, InliersData, ListenerHandle,
    PositionEstimator,
};
pub use model::{Fingerprint, Point, RadioSource, Reading};
