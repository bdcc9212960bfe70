//! Core value types: points, radio sources, readings and fingerprints.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// A point in `D`-dimensional space (`D` = 2 or 3).
///
/// Euclidean distance between two points is `(a - b).norm()`; tolerant
/// equality goes through the `approx` traits nalgebra implements
/// (`abs_diff_eq!`, `relative_eq!`).
pub type Point<const D: usize> = SVector<f64, D>;

/// A radio source at a known position.
///
/// The position may carry its own uncertainty as a covariance matrix, which
/// the estimator can fold into reading weights and into the covariance of
/// the final estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioSource<const D: usize> {
    /// Identifier readings refer to (e.g. a BSSID or beacon UUID).
    pub id: String,
    /// Known source position.
    pub position: Point<D>,
    /// Uncertainty of the source's own location, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position_covariance: Option<SMatrix<f64, D, D>>,
}

impl<const D: usize> RadioSource<D> {
    /// Source with an exactly known position.
    pub fn new(id: impl Into<String>, position: Point<D>) -> Self {
        Self {
            id: id.into(),
            position,
            position_covariance: None,
        }
    }

    /// Source with an uncertain position.
    pub fn with_covariance(
        id: impl Into<String>,
        position: Point<D>,
        covariance: SMatrix<f64, D, D>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            position_covariance: Some(covariance),
        }
    }
}

/// One range observation tied to a radio source.
///
/// The distance is either measured directly or derived upstream from signal
/// strength through a path-loss model; this crate only consumes the
/// resulting distance and its standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier of the observed source.
    pub source_id: String,
    /// Measured distance to the source.
    pub distance: f64,
    /// Standard deviation of the distance measurement, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub standard_deviation: Option<f64>,
}

impl Reading {
    /// Reading without an explicit standard deviation (the estimator applies
    /// its configured fallback).
    pub fn new(source_id: impl Into<String>, distance: f64) -> Self {
        Self {
            source_id: source_id.into(),
            distance,
            standard_deviation: None,
        }
    }

    /// Reading with a known measurement standard deviation.
    pub fn with_standard_deviation(
        source_id: impl Into<String>,
        distance: f64,
        standard_deviation: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            distance,
            standard_deviation: Some(standard_deviation),
        }
    }
}

/// The ordered set of readings collected for one estimation call.
///
/// Multiple readings per source are permitted; order is preserved and all
/// per-reading outputs (residuals, inlier flags) follow this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Readings in collection order.
    pub readings: Vec<Reading>,
}

impl Fingerprint {
    /// Fingerprint from an ordered reading list.
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the fingerprint holds no readings.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Flattened per-reading arrays built from sources + fingerprint, in
/// fingerprint reading order. Readings whose source id does not appear in
/// the source list are dropped during the build.
#[derive(Debug, Clone)]
pub(crate) struct ReadingSet<const D: usize> {
    /// Source position for each matched reading.
    pub positions: Vec<Point<D>>,
    /// Measured distance for each matched reading.
    pub distances: Vec<f64>,
    /// Standard deviation per reading, with the fallback already applied.
    pub sigmas: Vec<f64>,
    /// Weight per reading: 1/σ_eff², where σ_eff folds in the source
    /// position covariance when that option is enabled.
    pub weights: Vec<f64>,
    /// Combined quality score per reading (source score × reading score,
    /// both defaulting to 1).
    pub quality: Vec<f64>,
    /// Index into the distinct matched-source table for each reading.
    pub source_of: Vec<usize>,
    /// Reading indices grouped by distinct matched source.
    pub by_source: Vec<Vec<usize>>,
}

impl<const D: usize> ReadingSet<D> {
    pub(crate) fn build(
        sources: &[RadioSource<D>],
        fingerprint: &Fingerprint,
        fallback_sigma: f64,
        use_source_covariance: bool,
        source_scores: Option<&[f64]>,
        reading_scores: Option<&[f64]>,
    ) -> Self {
        let n = fingerprint.len();
        let mut set = Self {
            positions: Vec::with_capacity(n),
            distances: Vec::with_capacity(n),
            sigmas: Vec::with_capacity(n),
            weights: Vec::with_capacity(n),
            quality: Vec::with_capacity(n),
            source_of: Vec::with_capacity(n),
            by_source: Vec::new(),
        };

        // Distinct matched sources in first-seen order.
        let mut matched: Vec<usize> = Vec::new();

        for (reading_idx, reading) in fingerprint.readings.iter().enumerate() {
            let Some(src_idx) = sources.iter().position(|s| s.id == reading.source_id) else {
                tracing::debug!(
                    source_id = %reading.source_id,
                    "reading refers to an unknown source, skipping"
                );
                continue;
            };
            let source = &sources[src_idx];

            let sigma = reading
                .standard_deviation
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(fallback_sigma);
            let mut variance = sigma * sigma;
            if use_source_covariance {
                if let Some(cov) = &source.position_covariance {
                    // Isotropic approximation of the source position
                    // uncertainty along the unknown line of sight.
                    variance += cov.trace() / D as f64;
                }
            }

            let source_score = source_scores.map_or(1.0, |s| s[src_idx]);
            let reading_score = reading_scores.map_or(1.0, |s| s[reading_idx]);

            let local = match matched.iter().position(|&m| m == src_idx) {
                Some(local) => local,
                None => {
                    matched.push(src_idx);
                    set.by_source.push(Vec::new());
                    matched.len() - 1
                }
            };

            set.by_source[local].push(set.positions.len());
            set.positions.push(source.position);
            set.distances.push(reading.distance);
            set.sigmas.push(sigma);
            set.weights.push(1.0 / variance);
            set.quality.push(source_score * reading_score);
            set.source_of.push(local);
        }

        set
    }

    /// Number of matched readings.
    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }

    /// Number of distinct matched sources.
    pub(crate) fn distinct_sources(&self) -> usize {
        self.by_source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix2, Vector2};

    fn two_sources() -> Vec<RadioSource<2>> {
        vec![
            RadioSource::new("a", Vector2::new(0.0, 0.0)),
            RadioSource::with_covariance(
                "b",
                Vector2::new(10.0, 0.0),
                Matrix2::from_diagonal_element(4.0),
            ),
        ]
    }

    #[test]
    fn reading_set_preserves_fingerprint_order() {
        let sources = two_sources();
        let fingerprint = Fingerprint::new(vec![
            Reading::with_standard_deviation("b", 5.0, 0.5),
            Reading::new("a", 3.0),
            Reading::new("b", 5.5),
        ]);

        let set = ReadingSet::build(&sources, &fingerprint, 1.0, false, None, None);
        assert_eq!(set.len(), 3);
        assert_eq!(set.distances, vec![5.0, 3.0, 5.5]);
        assert_eq!(set.sigmas, vec![0.5, 1.0, 1.0]);
        // "b" seen first, so it gets local index 0.
        assert_eq!(set.source_of, vec![0, 1, 0]);
        assert_eq!(set.distinct_sources(), 2);
        assert_eq!(set.by_source[0], vec![0, 2]);
        assert_eq!(set.by_source[1], vec![1]);
    }

    #[test]
    fn reading_set_drops_unknown_sources() {
        let sources = two_sources();
        let fingerprint = Fingerprint::new(vec![
            Reading::new("a", 3.0),
            Reading::new("nope", 1.0),
            Reading::new("b", 5.0),
        ]);

        let set = ReadingSet::build(&sources, &fingerprint, 1.0, false, None, None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.distances, vec![3.0, 5.0]);
    }

    #[test]
    fn source_covariance_inflates_variance_only_when_enabled() {
        let sources = two_sources();
        let fingerprint = Fingerprint::new(vec![
            Reading::with_standard_deviation("a", 3.0, 1.0),
            Reading::with_standard_deviation("b", 5.0, 1.0),
        ]);

        let plain = ReadingSet::build(&sources, &fingerprint, 1.0, false, None, None);
        assert!((plain.weights[0] - 1.0).abs() < 1e-12);
        assert!((plain.weights[1] - 1.0).abs() < 1e-12);

        let inflated = ReadingSet::build(&sources, &fingerprint, 1.0, true, None, None);
        // "a" has no covariance, weight unchanged.
        assert!((inflated.weights[0] - 1.0).abs() < 1e-12);
        // "b" has trace 8 over 2 dims: variance 1 + 4 = 5.
        assert!((inflated.weights[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn invalid_reading_sigma_falls_back() {
        let sources = two_sources();
        let fingerprint = Fingerprint::new(vec![
            Reading::with_standard_deviation("a", 3.0, 0.0),
            Reading::with_standard_deviation("a", 3.0, f64::NAN),
        ]);
        let set = ReadingSet::build(&sources, &fingerprint, 2.0, false, None, None);
        assert_eq!(set.sigmas, vec![2.0, 2.0]);
    }

    #[test]
    fn quality_scores_combine_source_and_reading() {
        let sources = two_sources();
        let fingerprint = Fingerprint::new(vec![Reading::new("b", 5.0), Reading::new("a", 3.0)]);
        let set = ReadingSet::build(
            &sources,
            &fingerprint,
            1.0,
            false,
            Some(&[0.5, 0.8]),
            Some(&[0.5, 1.0]),
        );
        // Reading 0 observes source "b" (index 1 in the source list).
        assert!((set.quality[0] - 0.4).abs() < 1e-12);
        assert!((set.quality[1] - 0.5).abs() < 1e-12);
    }
}
