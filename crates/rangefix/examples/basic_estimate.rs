use nalgebra::Vector2;
use rangefix::{Fingerprint, PositionEstimator, RadioSource, Reading, RobustMethod};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Six access points on a circle, receiver at (4, -3).
    let truth = Vector2::new(4.0, -3.0);
    let sources: Vec<RadioSource<2>> = (0..6)
        .map(|i| {
            let theta = i as f64 * std::f64::consts::TAU / 6.0;
            RadioSource::new(
                format!("ap-{i}"),
                Vector2::new(20.0 * theta.cos(), 20.0 * theta.sin()),
            )
        })
        .collect();
    let readings: Vec<Reading> = sources
        .iter()
        .map(|s| {
            Reading::with_standard_deviation(s.id.clone(), (truth - s.position).norm(), 0.1)
        })
        .collect();

    let mut estimator = PositionEstimator::<2>::new(RobustMethod::Ransac);
    estimator.set_sources(sources)?;
    estimator.set_fingerprint(Fingerprint::new(readings))?;

    let result = estimator.estimate()?;
    println!(
        "Estimated ({:.4}, {:.4}) in {} iterations, true position ({}, {}).",
        result.position.x, result.position.y, result.iterations, truth.x, truth.y
    );
    if let Some(cov) = result.covariance {
        println!("Covariance diagonal: [{:.3e}, {:.3e}]", cov[(0, 0)], cov[(1, 1)]);
    }
    Ok(())
}
