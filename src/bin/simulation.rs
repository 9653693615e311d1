//! Synthetic Well-Test Simulation
//!
//! Generates a synthetic gauge record from known reservoir parameters, runs
//! the full analysis pipeline on it and prints a JSON report:
//! - Diagnostic curve and flow-regime segments
//! - Semi-log straight-line estimate
//! - Auto-match (cancellable, Ctrl+C or `--time-limit`)
//! - Flow capacity, IPR and forecast with its stimulated variant
//!
//! # Usage
//! ```bash
//! ./pta-simulate --test-type buildup --permeability 50 --skin 5 --noise 0.01 --seed 7 > report.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use welltest_engine::config::{self, EngineConfig};
use welltest_engine::deliverability::{flow_capacity, Forecast, IprCurve, RateSchedule};
use welltest_engine::matching::{MatchEvent, MatchRequest, MatchTask};
use welltest_engine::types::{
    keys, DiagnosticPoint, FlowCapacity, FlowRegime, FlowRegimeSegment, FluidType, IprMethod, MatchOutcome,
    ModelParameters, ModelType, SemiLogOutcome, TestConfig, TestType,
};
use welltest_engine::units::UnitSystem;
use welltest_engine::{diagnostics, semilog, RegimeClassifier, SyntheticTest};

// ============================================================================
// Reservoir Constants
// ============================================================================

/// Porosity (fraction)
const POROSITY: f64 = 0.2;
/// Total compressibility (1/psi)
const TOTAL_COMPRESSIBILITY: f64 = 3e-6;
/// Wellbore radius (ft)
const WELLBORE_RADIUS: f64 = 0.35;
/// Net thickness (ft)
const THICKNESS: f64 = 50.0;
/// Initial reservoir pressure (psia)
const INITIAL_PRESSURE: f64 = 5000.0;
/// Formation volume factor (RB/STB)
const FORMATION_VOLUME_FACTOR: f64 = 1.2;
/// Viscosity (cp)
const VISCOSITY: f64 = 1.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TestKind {
    Drawdown,
    Buildup,
    Injection,
    Falloff,
}

impl From<TestKind> for TestType {
    fn from(kind: TestKind) -> Self {
        match kind {
            TestKind::Drawdown => TestType::Drawdown,
            TestKind::Buildup => TestType::Buildup,
            TestKind::Injection => TestType::Injection,
            TestKind::Falloff => TestType::Falloff,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelKind {
    Homogeneous,
    DualPorosity,
    Bounded,
}

impl From<ModelKind> for ModelType {
    fn from(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Homogeneous => ModelType::HomogeneousRadial,
            ModelKind::DualPorosity => ModelType::DualPorosity,
            ModelKind::Bounded => ModelType::BoundedCircular,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IprKind {
    Darcy,
    Vogel,
}

impl From<IprKind> for IprMethod {
    fn from(kind: IprKind) -> Self {
        match kind {
            IprKind::Darcy => IprMethod::Darcy,
            IprKind::Vogel => IprMethod::Vogel,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pta-simulate")]
#[command(about = "Synthetic pressure-transient test generation and analysis")]
#[command(version = "1.0")]
struct Args {
    /// Kind of transient test
    #[arg(short, long, value_enum, default_value = "buildup")]
    test_type: TestKind,

    /// Reservoir model used to generate the record
    #[arg(short, long, value_enum, default_value = "homogeneous")]
    model: ModelKind,

    /// True permeability (md)
    #[arg(short = 'k', long, default_value = "50")]
    permeability: f64,

    /// True skin factor
    #[arg(short, long, default_value = "5", allow_hyphen_values = true)]
    skin: f64,

    /// True wellbore storage coefficient (bbl/psi)
    #[arg(short = 'C', long, default_value = "0.01")]
    storage: f64,

    /// Storativity ratio for the dual-porosity model
    #[arg(long, default_value = "0.1")]
    omega: f64,

    /// Interporosity flow coefficient for the dual-porosity model
    #[arg(long, default_value = "1e-6")]
    lambda: f64,

    /// Outer boundary radius for the bounded model (ft)
    #[arg(long, default_value = "1500")]
    boundary_radius: f64,

    /// Test-period rate (STB/D)
    #[arg(short, long, default_value = "500")]
    rate: f64,

    /// Producing time before shut-in (hours)
    #[arg(long, default_value = "720")]
    producing_time: f64,

    /// Last elapsed time of the record (hours)
    #[arg(short = 'H', long, default_value = "48")]
    hours: f64,

    /// Number of log-spaced samples
    #[arg(short, long, default_value = "400")]
    points: usize,

    /// Gaussian noise as a fraction of the radial-flow derivative level
    #[arg(short, long, default_value = "0.01")]
    noise: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Cancel the auto-match after this many seconds
    #[arg(long, default_value = "60")]
    time_limit: u64,

    /// IPR relation for the deliverability report
    #[arg(long, value_enum, default_value = "darcy")]
    ipr: IprKind,

    /// Forecast horizon (hours)
    #[arg(long, default_value = "720")]
    forecast_hours: f64,

    /// Engine config file (otherwise $PTA_CONFIG, ./pta_config.toml, defaults)
    #[arg(long, env = "PTA_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn test_config(&self) -> TestConfig {
        TestConfig {
            test_type: self.test_type.into(),
            fluid_type: FluidType::Oil,
            unit_system: UnitSystem::Field,
            porosity: POROSITY,
            total_compressibility: TOTAL_COMPRESSIBILITY,
            wellbore_radius: WELLBORE_RADIUS,
            thickness: THICKNESS,
            initial_pressure: INITIAL_PRESSURE,
            producing_time: Some(self.producing_time),
            rate: self.rate,
            formation_volume_factor: FORMATION_VOLUME_FACTOR,
            viscosity: VISCOSITY,
            reference_pressure: None,
        }
    }

    fn truth(&self) -> ModelParameters {
        match ModelType::from(self.model) {
            ModelType::HomogeneousRadial => {
                ModelParameters::homogeneous(self.permeability, self.skin, self.storage)
            }
            ModelType::DualPorosity => ModelParameters::dual_porosity(
                self.permeability,
                self.skin,
                self.storage,
                self.omega,
                self.lambda,
            ),
            ModelType::BoundedCircular => ModelParameters::bounded_circular(
                self.permeability,
                self.skin,
                self.storage,
                self.boundary_radius,
            ),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct Report {
    test: TestConfig,
    truth: ModelParameters,
    diagnostics: Vec<DiagnosticPoint>,
    regimes: Vec<FlowRegimeSegment>,
    semilog: SemiLogOutcome,
    initial_guess: ModelParameters,
    #[serde(rename = "match")]
    outcome: MatchResult,
    deliverability: Option<Deliverability>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum MatchResult {
    Completed(MatchOutcome),
    Cancelled { best: Option<ModelParameters> },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
struct Deliverability {
    capacity: FlowCapacity,
    ipr: Vec<(f64, f64)>,
    forecast: Vec<(f64, f64)>,
    forecast_stimulated: Vec<(f64, f64)>,
}

fn deliverability(
    params: &ModelParameters,
    test: &TestConfig,
    args: &Args,
    settings: &config::DeliverabilitySettings,
) -> Result<Deliverability> {
    let capacity = flow_capacity(params, test, settings).context("flow capacity")?;
    let ipr = IprCurve::new(
        args.ipr.into(),
        test.fluid_type,
        capacity.productivity_index,
        test.initial_pressure,
        settings.ipr_points,
    )
    .context("IPR curve")?;

    let forecast = Forecast::new(
        params,
        test,
        RateSchedule::constant(test.rate_magnitude()),
        args.forecast_hours,
        settings.forecast_steps,
    )
    .context("forecast")?;
    let stimulated = forecast.stimulated().context("stimulated forecast")?;

    Ok(Deliverability {
        capacity,
        ipr: ipr.points().collect(),
        forecast: forecast.points().collect(),
        forecast_stimulated: stimulated.points().collect(),
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    config::init(engine_config);
    let cfg = config::get();

    let test = args.test_config();
    let truth = args.truth();
    info!(
        test_type = %test.test_type,
        model = %truth.model_type,
        permeability = truth.permeability,
        skin = truth.skin,
        storage = truth.storage,
        "Generating synthetic record"
    );

    // Synthetic record
    let mut synthetic = SyntheticTest::new(truth.clone(), test.clone());
    synthetic.end_hours = args.hours;
    synthetic.points = args.points;
    let noise_std = args.noise * synthetic.iarf_derivative_level();
    let samples = synthetic
        .with_noise(noise_std, args.seed)
        .generate()
        .context("generating synthetic samples")?;

    // Diagnostics, regimes, semi-log
    let series = diagnostics::compute(&samples, &test, &cfg.diagnostics).context("diagnostic curve")?;
    let regimes = RegimeClassifier::classify(&series.points, &cfg.regimes);
    let iarf = regimes.iter().find(|s| s.regime == FlowRegime::Iarf);
    let storage_segment = regimes.iter().find(|s| s.regime == FlowRegime::WellboreStorage);
    let semilog_outcome = semilog::analyze(&series, iarf, &test, &cfg.semilog).context("semi-log analysis")?;
    let storage = semilog::storage_estimate(&series, storage_segment, &test).unwrap_or(args.storage);

    let initial_guess = match semilog_outcome.estimate() {
        Some(estimate) => {
            info!(
                permeability = estimate.permeability,
                skin = estimate.skin,
                points = estimate.points_used,
                "Semi-log estimate"
            );
            semilog::initial_guess(estimate, storage, truth.model_type, &regimes, &test)
        }
        None => {
            warn!("No semi-log estimate, seeding the match from the generating parameters");
            let mut seed = truth.clone();
            seed.permeability *= 0.7;
            seed.skin = 0.0;
            seed.storage = storage;
            if let Some(radius) = seed.model_specific.get_mut(keys::BOUNDARY_RADIUS) {
                *radius *= 1.5;
            }
            seed
        }
    };

    // Auto-match in the background, cancelled by Ctrl+C or the time limit
    let handle = MatchTask::spawn(MatchRequest {
        series: series.clone(),
        initial: initial_guess.clone(),
        segments: regimes.clone(),
        test: test.clone(),
        settings: cfg.matching.clone(),
    })
    .context("starting auto-match")?;

    let shutdown_token = handle.cancellation_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, cancelling auto-match");
        shutdown_token.cancel();
    });

    let outcome = match handle.finish_within(Duration::from_secs(args.time_limit)).await {
        Some(MatchEvent::Completed(outcome)) => MatchResult::Completed(outcome),
        Some(MatchEvent::Cancelled { best }) => MatchResult::Cancelled { best },
        Some(MatchEvent::Failed(e)) => MatchResult::Failed { error: e.to_string() },
        Some(MatchEvent::Progress { .. }) | None => MatchResult::Failed {
            error: "auto-match ended without a result".to_string(),
        },
    };

    let fitted = match &outcome {
        MatchResult::Completed(outcome) => Some(&outcome.parameters),
        MatchResult::Cancelled { best } => best.as_ref(),
        MatchResult::Failed { .. } => None,
    };
    let deliverability = match fitted {
        Some(params) => match deliverability(params, &test, &args, &cfg.deliverability) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "Deliverability skipped");
                None
            }
        },
        None => None,
    };

    let report = Report {
        test,
        truth,
        diagnostics: series.points,
        regimes,
        semilog: semilog_outcome,
        initial_guess,
        outcome,
        deliverability,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
