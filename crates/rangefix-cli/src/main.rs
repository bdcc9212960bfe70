//! rangefix CLI — estimate receiver positions from range-observation
//! scenarios in JSON, and generate synthetic scenarios to exercise the
//! estimator end to end.

use clap::{Args, Parser, Subcommand, ValueEnum};
use nalgebra::SVector;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use rangefix::{
    EstimateResult, Fingerprint, PositionEstimator, RadioSource, Reading, RobustMethod,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "rangefix")]
#[command(about = "Robust position estimation from noisy range observations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate a position from a scenario file.
    Estimate(EstimateArgs),

    /// Generate a synthetic scenario with optional gross outliers.
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Ransac,
    Lmeds,
    Msac,
    Prosac,
    Promeds,
}

impl From<MethodArg> for RobustMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Ransac => RobustMethod::Ransac,
            MethodArg::Lmeds => RobustMethod::Lmeds,
            MethodArg::Msac => RobustMethod::Msac,
            MethodArg::Prosac => RobustMethod::Prosac,
            MethodArg::Promeds => RobustMethod::Promeds,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct EstimateArgs {
    /// Path to the scenario JSON.
    #[arg(long)]
    scenario: PathBuf,

    /// Path to write the estimation report (JSON). Prints a summary either way.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Consensus variant. Defaults to PROMedS when the scenario carries
    /// quality scores, LMedS otherwise.
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Inlier threshold for the fixed-threshold variants.
    #[arg(long)]
    threshold: Option<f64>,

    /// Maximum consensus iterations.
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Subset-sampling RNG seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    /// Path to write the scenario JSON.
    #[arg(long)]
    out: PathBuf,

    /// Dimensionality of the scenario (2 or 3).
    #[arg(long, default_value = "2")]
    dimensions: usize,

    /// Number of radio sources.
    #[arg(long, default_value = "10")]
    sources: usize,

    /// Source layout radius around the origin.
    #[arg(long, default_value = "25.0")]
    radius: f64,

    /// Uniform distance-noise amplitude applied to every reading.
    #[arg(long, default_value = "0.1")]
    noise: f64,

    /// Fraction of readings corrupted with a gross additive error.
    #[arg(long, default_value = "0.2")]
    outlier_fraction: f64,

    /// Magnitude of the gross additive error.
    #[arg(long, default_value = "40.0")]
    outlier_offset: f64,

    /// Scenario RNG seed.
    #[arg(long, default_value = "7")]
    seed: u64,
}

// ── Scenario schema ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioSource {
    id: String,
    position: Vec<f64>,
    /// Isotropic variance of the source's own position, if uncertain.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    position_variance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioReading {
    source_id: String,
    distance: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    standard_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scenario {
    dimensions: usize,
    sources: Vec<ScenarioSource>,
    readings: Vec<ScenarioReading>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    source_quality_scores: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    reading_quality_scores: Option<Vec<f64>>,
    /// Ground truth, kept so reports can state the achieved error.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    true_position: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
struct Report {
    method: String,
    position: Vec<f64>,
    iterations: usize,
    n_readings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_inliers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inlier_threshold: Option<f64>,
    /// Row-major covariance of the estimate, when kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    covariance: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_to_truth: Option<f64>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Estimate(args) => run_estimate(&args),
        Commands::Simulate(args) => run_simulate(&args),
    }
}

fn run_estimate(args: &EstimateArgs) -> CliResult<()> {
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(&args.scenario)?)?;
    let report = match scenario.dimensions {
        2 => estimate_scenario::<2>(&scenario, args)?,
        3 => estimate_scenario::<3>(&scenario, args)?,
        d => return Err(format!("unsupported dimensionality: {d} (expected 2 or 3)").into()),
    };

    println!(
        "{}: position {:?}, {} iterations, {} inliers of {} readings",
        report.method,
        report.position,
        report.iterations,
        report
            .n_inliers
            .map_or_else(|| "?".to_string(), |n| n.to_string()),
        report.n_readings,
    );
    if let Some(err) = report.error_to_truth {
        println!("error to truth: {err:.4}");
    }
    if let Some(out) = &args.out {
        write_json(out, &report)?;
        println!("Wrote {}", out.display());
    }
    Ok(())
}

fn estimate_scenario<const D: usize>(
    scenario: &Scenario,
    args: &EstimateArgs,
) -> CliResult<Report>
where
    nalgebra::Const<D>: nalgebra::DimMin<nalgebra::Const<D>, Output = nalgebra::Const<D>>,
{
    let sources = scenario
        .sources
        .iter()
        .map(|s| {
            let position = point_from(&s.position)?;
            Ok(match s.position_variance {
                Some(var) => RadioSource::with_covariance(
                    s.id.clone(),
                    position,
                    nalgebra::SMatrix::<f64, D, D>::identity() * var,
                ),
                None => RadioSource::new(s.id.clone(), position),
            })
        })
        .collect::<CliResult<Vec<RadioSource<D>>>>()?;

    let readings = scenario
        .readings
        .iter()
        .map(|r| Reading {
            source_id: r.source_id.clone(),
            distance: r.distance,
            standard_deviation: r.standard_deviation,
        })
        .collect();

    let method = args.method.map(RobustMethod::from).unwrap_or_else(|| {
        RobustMethod::default_for(
            scenario.source_quality_scores.is_some() || scenario.reading_quality_scores.is_some(),
        )
    });

    let mut estimator = PositionEstimator::<D>::new(method);
    estimator.set_sources(sources)?;
    estimator.set_fingerprint(Fingerprint::new(readings))?;
    estimator.set_source_quality_scores(scenario.source_quality_scores.clone())?;
    estimator.set_fingerprint_reading_quality_scores(scenario.reading_quality_scores.clone())?;
    if let Some(threshold) = args.threshold {
        estimator.set_threshold(threshold)?;
    }
    if let Some(max_iterations) = args.max_iterations {
        estimator.set_max_iterations(max_iterations)?;
    }
    if let Some(seed) = args.seed {
        estimator.set_seed(seed)?;
    }

    let result = estimator.estimate()?;
    Ok(build_report::<D>(scenario, method, &result))
}

fn build_report<const D: usize>(
    scenario: &Scenario,
    method: RobustMethod,
    result: &EstimateResult<D>,
) -> Report {
    let error_to_truth = scenario
        .true_position
        .as_ref()
        .and_then(|t| point_from::<D>(t).ok())
        .map(|truth| (result.position - truth).norm());

    Report {
        method: method.to_string(),
        position: result.position.iter().copied().collect(),
        iterations: result.iterations,
        n_readings: scenario.readings.len(),
        n_inliers: result.inliers.as_ref().map(|i| i.n_inliers),
        inlier_threshold: result.inliers.as_ref().map(|i| i.threshold),
        covariance: result.covariance.map(|cov| {
            (0..D)
                .map(|r| (0..D).map(|c| cov[(r, c)]).collect())
                .collect()
        }),
        error_to_truth,
    }
}

fn run_simulate(args: &SimulateArgs) -> CliResult<()> {
    let scenario = match args.dimensions {
        2 => simulate_scenario::<2>(args),
        3 => simulate_scenario::<3>(args),
        d => return Err(format!("unsupported dimensionality: {d} (expected 2 or 3)").into()),
    };
    write_json(&args.out, &scenario)?;
    println!(
        "Wrote {} ({} sources, {} readings, {:.0}% outliers)",
        args.out.display(),
        scenario.sources.len(),
        scenario.readings.len(),
        args.outlier_fraction * 100.0,
    );
    Ok(())
}

fn simulate_scenario<const D: usize>(args: &SimulateArgs) -> Scenario {
    let mut rng = StdRng::seed_from_u64(args.seed);

    let truth = SVector::<f64, D>::from_fn(|_, _| rng.gen_range(-args.radius..args.radius) * 0.4);

    let sources: Vec<ScenarioSource> = (0..args.sources.max(D + 2))
        .map(|i| {
            // Sources on a circle (2D) or a jittered sphere shell (3D).
            let theta = i as f64 * std::f64::consts::TAU / args.sources.max(D + 2) as f64;
            let mut position = vec![args.radius * theta.cos(), args.radius * theta.sin()];
            if D == 3 {
                position.push(rng.gen_range(-args.radius..args.radius));
            }
            ScenarioSource {
                id: format!("src-{i}"),
                position,
                position_variance: None,
            }
        })
        .collect();

    let n_outliers = ((sources.len() as f64) * args.outlier_fraction).round() as usize;
    let mut outlier_picks: Vec<usize> = (0..sources.len()).collect();
    outlier_picks.shuffle(&mut rng);
    outlier_picks.truncate(n_outliers);

    let readings: Vec<ScenarioReading> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let source_pos = SVector::<f64, D>::from_iterator(s.position.iter().copied());
            let mut distance = (truth - source_pos).norm();
            if args.noise > 0.0 {
                distance += rng.gen_range(-args.noise..args.noise);
            }
            if outlier_picks.contains(&i) {
                distance += args.outlier_offset;
            }
            ScenarioReading {
                source_id: s.id.clone(),
                distance: distance.max(0.0),
                standard_deviation: Some(args.noise.max(1e-3)),
            }
        })
        .collect();

    Scenario {
        dimensions: D,
        sources,
        readings,
        source_quality_scores: None,
        reading_quality_scores: None,
        true_position: Some(truth.iter().copied().collect()),
    }
}

fn point_from<const D: usize>(coords: &[f64]) -> CliResult<SVector<f64, D>> {
    if coords.len() != D {
        return Err(format!("expected {D} coordinates, got {}", coords.len()).into());
    }
    Ok(SVector::<f64, D>::from_iterator(coords.iter().copied()))
}

fn write_json(path: &Path, value: &impl Serialize) -> CliResult<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
