use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Vector2;
use rangefix::{Fingerprint, PositionEstimator, RadioSource, Reading, RobustMethod};

fn scenario(n_sources: usize, outliers: &[usize]) -> (Vec<RadioSource<2>>, Fingerprint) {
    let truth = Vector2::new(3.0, -4.0);
    let sources: Vec<RadioSource<2>> = (0..n_sources)
        .map(|i| {
            let theta = i as f64 * std::f64::consts::TAU / n_sources as f64;
            RadioSource::new(
                format!("src-{i}"),
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
    for &i in outliers {
        readings[i].distance += 40.0;
    }
    (sources, Fingerprint::new(readings))
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    for method in [RobustMethod::Ransac, RobustMethod::Lmeds, RobustMethod::Promeds] {
        let (sources, fingerprint) = scenario(16, &[2, 7, 11]);
        group.bench_function(format!("{method}_16_readings_3_outliers"), |b| {
            b.iter(|| {
                let mut estimator = PositionEstimator::<2>::new(method);
                estimator.set_sources(black_box(sources.clone())).unwrap();
                estimator
                    .set_fingerprint(black_box(fingerprint.clone()))
                    .unwrap();
                black_box(estimator.estimate().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_estimate);
criterion_main!(benches);
