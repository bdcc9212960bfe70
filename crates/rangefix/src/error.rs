//! Error taxonomy for configuration, solving and robust estimation.

/// Errors from a single lateration solve.
///
/// Inside the consensus loop these mark a subset as unusable; they only
/// surface to callers wrapped in [`EstimateError::RobustFailure`] when every
/// sampled subset failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// Too few readings for the requested solving mode.
    TooFewReadings {
        /// Required minimum number of readings.
        needed: usize,
        /// Provided number of readings.
        got: usize,
    },
    /// Source geometry is numerically singular (e.g. collinear sources).
    DegenerateGeometry,
    /// The iterative solver diverged or produced non-finite values.
    DidNotConverge,
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewReadings { needed, got } => {
                write!(f, "too few readings: need {}, got {}", needed, got)
            }
            Self::DegenerateGeometry => write!(f, "degenerate source geometry"),
            Self::DidNotConverge => write!(f, "solver did not converge"),
        }
    }
}

impl std::error::Error for SolveError {}

/// Errors raised by the position estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Fewer sources than the solver minimum for the configured
    /// dimensionality and solving mode.
    TooFewSources {
        /// Required minimum number of sources.
        needed: usize,
        /// Provided number of sources.
        got: usize,
    },
    /// Fewer fingerprint readings than the solver minimum.
    TooFewReadings {
        /// Required minimum number of readings.
        needed: usize,
        /// Provided number of readings.
        got: usize,
    },
    /// A quality-score array does not match its collection length.
    QualityScoreLengthMismatch {
        /// Length of the corresponding collection.
        expected: usize,
        /// Length of the provided score array.
        got: usize,
    },
    /// Requested preliminary subset size is below the solver minimum.
    SubsetSizeTooSmall {
        /// Solver minimum for the current dimensionality and mode.
        minimum: usize,
        /// Requested subset size.
        got: usize,
    },
    /// A scalar configuration value is out of its valid range.
    InvalidConfigValue {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
    /// `estimate()` was invoked before sources and fingerprint made the
    /// instance ready.
    NotReady,
    /// A mutator or a re-entrant `estimate()` was invoked while an
    /// estimation is running.
    Locked,
    /// No hypothesis accumulated enough consensus within the iteration
    /// budget, or every sampled subset failed to solve.
    RobustFailure {
        /// Iterations performed before giving up.
        iterations: usize,
        /// Last per-subset solve failure, when one was observed.
        cause: Option<SolveError>,
    },
    /// The refinement step produced a covariance that is not positive
    /// definite.
    CovarianceNotPositiveDefinite,
}

impl std::fmt::Display for EstimateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewSources { needed, got } => {
                write!(f, "too few sources: need {}, got {}", needed, got)
            }
            Self::TooFewReadings { needed, got } => {
                write!(f, "too few readings: need {}, got {}", needed, got)
            }
            Self::QualityScoreLengthMismatch { expected, got } => {
                write!(
                    f,
                    "quality score length mismatch: expected {}, got {}",
                    expected, got
                )
            }
            Self::SubsetSizeTooSmall { minimum, got } => {
                write!(f, "subset size too small: minimum {}, got {}", minimum, got)
            }
            Self::InvalidConfigValue { name, reason } => {
                write!(f, "invalid value for {}: {}", name, reason)
            }
            Self::NotReady => write!(f, "estimator is not ready (missing sources or fingerprint)"),
            Self::Locked => write!(f, "estimator is locked by a running estimation"),
            Self::RobustFailure { iterations, cause } => {
                write!(f, "no consensus after {} iterations", iterations)?;
                if let Some(cause) = cause {
                    write!(f, " (last subset failure: {})", cause)?;
                }
                Ok(())
            }
            Self::CovarianceNotPositiveDefinite => {
                write!(f, "estimated covariance is not positive definite")
            }
        }
    }
}

impl std::error::Error for EstimateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RobustFailure {
                cause: Some(cause), ..
            } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robust_failure_reports_cause() {
        let err = EstimateError::RobustFailure {
            iterations: 17,
            cause: Some(SolveError::DegenerateGeometry),
        };
        let text = err.to_string();
        assert!(text.contains("17"));
        assert!(text.contains("degenerate"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn plain_errors_have_no_source() {
        assert!(std::error::Error::source(&EstimateError::NotReady).is_none());
        assert!(std::error::Error::source(&EstimateError::Locked).is_none());
    }
}
