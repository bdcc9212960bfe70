//! Shared synthetic-scenario builders for unit tests.

use nalgebra::{Vector2, Vector3};

use crate::model::{Fingerprint, Point, RadioSource, Reading};

/// Sources evenly spaced on a circle around the origin.
pub(crate) fn ring_sources_2d(n: usize, radius: f64) -> Vec<RadioSource<2>> {
    (0..n)
        .map(|i| {
            let theta = i as f64 * std::f64::consts::TAU / n as f64;
            RadioSource::new(
                format!("src-{i}"),
                Vector2::new(radius * theta.cos(), radius * theta.sin()),
            )
        })
        .collect()
}

/// Ten sources: the corners of a cube plus two axis beacons, so no four
/// are coplanar.
pub(crate) fn cube_sources_3d(half: f64) -> Vec<RadioSource<3>> {
    let mut sources = Vec::with_capacity(10);
    let mut i = 0;
    for &x in &[-half, half] {
        for &y in &[-half, half] {
            for &z in &[-half, half] {
                sources.push(RadioSource::new(format!("src-{i}"), Vector3::new(x, y, z)));
                i += 1;
            }
        }
    }
    sources.push(RadioSource::new("src-8", Vector3::new(0.0, 0.0, 1.7 * half)));
    sources.push(RadioSource::new("src-9", Vector3::new(0.0, 1.7 * half, 0.0)));
    sources
}

/// One exact reading per source, measured from `truth`, carrying `sigma`
/// as the recorded standard deviation.
pub(crate) fn exact_fingerprint<const D: usize>(
    sources: &[RadioSource<D>],
    truth: &Point<D>,
    sigma: f64,
) -> Fingerprint {
    Fingerprint::new(
        sources
            .iter()
            .map(|s| {
                Reading::with_standard_deviation(
                    s.id.clone(),
                    (truth - s.position).norm(),
                    sigma,
                )
            })
            .collect(),
    )
}

/// Add a gross additive error to the readings at the given indices.
pub(crate) fn corrupt_readings(fingerprint: &mut Fingerprint, indices: &[usize], offset: f64) {
    for &i in indices {
        fingerprint.readings[i].distance += offset;
    }
}
