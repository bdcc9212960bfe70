//! Demonstrates outlier rejection: one in five readings carries a gross
//! non-line-of-sight error, and each consensus variant still recovers the
//! receiver position.

use nalgebra::Vector2;
use rangefix::{Fingerprint, PositionEstimator, RadioSource, Reading, RobustMethod};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let truth = Vector2::new(-2.0, 6.0);
    let sources: Vec<RadioSource<2>> = (0..10)
        .map(|i| {
            let theta = i as f64 * std::f64::consts::TAU / 10.0;
            RadioSource::new(
                format!("beacon-{i}"),
                Vector2::new(30.0 * theta.cos(), 30.0 * theta.sin()),
            )
        })
        .collect();

    let mut readings: Vec<Reading> = sources
        .iter()
        .map(|s| {
            Reading::with_standard_deviation(s.id.clone(), (truth - s.position).norm(), 0.1)
        })
        .collect();
    // Multipath on two of the ten links.
    readings[3].distance += 35.0;
    readings[8].distance += 50.0;

    for method in [
        RobustMethod::Ransac,
        RobustMethod::Lmeds,
        RobustMethod::Msac,
        RobustMethod::Prosac,
        RobustMethod::Promeds,
    ] {
        let mut estimator = PositionEstimator::<2>::new(method);
        estimator.set_sources(sources.clone())?;
        estimator.set_fingerprint(Fingerprint::new(readings.clone()))?;
        let result = estimator.estimate()?;
        let inliers = result
            .inliers
            .map(|i| i.n_inliers)
            .unwrap_or_default();
        println!(
            "{method:>8}: error {:.2e}, {inliers}/10 inliers, {} iterations",
            (result.position - truth).norm(),
            result.iterations,
        );
    }
    Ok(())
}
