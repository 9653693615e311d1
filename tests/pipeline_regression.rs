//! Pipeline Regression Tests
//!
//! Runs a noisy synthetic buildup through the whole engine: diagnostics,
//! regime classification, semi-log analysis, auto-match and deliverability.
//!
//! Scenario: 720 h of production at 500 STB/D, then a 48 h buildup sampled
//! log-uniformly from 0.01 h. Truth k = 50 md, s = 5, C = 0.01 bbl/psi.
//! Noise is Gaussian with σ = 1% of the radial-flow derivative level.

use welltest_engine::config::{DeliverabilitySettings, DiagnosticSettings, EngineConfig, RegimeSettings};
use welltest_engine::deliverability::{flow_capacity, Forecast, IprCurve, RateSchedule};
use welltest_engine::matching::auto_match;
use welltest_engine::types::{
    DiagnosticSeries, FlowRegime, FlowRegimeSegment, FluidType, IprMethod, ModelParameters, ModelType,
    SuperpositionKind, TestConfig, TestType,
};
use welltest_engine::units::UnitSystem;
use welltest_engine::{diagnostics, semilog, RegimeClassifier, SyntheticTest};

fn buildup_config() -> TestConfig {
    TestConfig {
        test_type: TestType::Buildup,
        fluid_type: FluidType::Oil,
        unit_system: UnitSystem::Field,
        porosity: 0.2,
        total_compressibility: 3e-6,
        wellbore_radius: 0.35,
        thickness: 50.0,
        initial_pressure: 5000.0,
        producing_time: Some(720.0),
        rate: 500.0,
        formation_volume_factor: 1.2,
        viscosity: 1.0,
        reference_pressure: None,
    }
}

fn truth() -> ModelParameters {
    ModelParameters::homogeneous(50.0, 5.0, 0.01)
}

/// Engine settings for a noisy record: wider derivative smoothing and slope window.
fn noisy_config() -> EngineConfig {
    EngineConfig {
        diagnostics: DiagnosticSettings {
            smoothing: 0.5,
            ..DiagnosticSettings::default()
        },
        regimes: RegimeSettings {
            window_log_cycles: 0.5,
            ..RegimeSettings::default()
        },
        ..EngineConfig::default()
    }
}

fn noisy_buildup(seed: u64) -> (DiagnosticSeries, Vec<FlowRegimeSegment>, TestConfig, EngineConfig) {
    let test = buildup_config();
    let config = noisy_config();
    let synthetic = SyntheticTest::new(truth(), test.clone());
    let sigma = 0.01 * synthetic.iarf_derivative_level();
    let samples = synthetic.with_noise(sigma, Some(seed)).generate().unwrap();

    let series = diagnostics::compute(&samples, &test, &config.diagnostics).unwrap();
    let segments = RegimeClassifier::classify(&series.points, &config.regimes);
    (series, segments, test, config)
}

fn find(segments: &[FlowRegimeSegment], regime: FlowRegime) -> Option<&FlowRegimeSegment> {
    segments.iter().find(|s| s.regime == regime)
}

#[test]
fn buildup_uses_horner_time() {
    let (series, _, _, _) = noisy_buildup(11);
    assert_eq!(series.superposition, SuperpositionKind::Horner { producing_time: 720.0 });
    assert_eq!(series.len(), 401);
    assert!(series.points.iter().all(|p| p.delta_pressure.is_finite()));
}

#[test]
fn noisy_buildup_shows_radial_flow() {
    let (_, segments, _, _) = noisy_buildup(11);
    let iarf = find(&segments, FlowRegime::Iarf).expect("IARF segment");

    assert!(iarf.start_time > 0.3 && iarf.start_time < 8.0, "IARF starts at {}", iarf.start_time);
    assert!(iarf.log_cycles() > 0.6, "IARF spans {} cycles", iarf.log_cycles());
    assert!(iarf.mean_slope.abs() < 0.1);
    if let Some(storage) = find(&segments, FlowRegime::WellboreStorage) {
        assert!(storage.end_time < iarf.start_time);
    }
    assert!(segments.windows(2).all(|w| w[0].end_time <= w[1].start_time));
}

#[test]
fn semilog_estimate_is_close_to_truth() {
    let (series, segments, test, config) = noisy_buildup(11);
    let outcome = semilog::analyze(&series, find(&segments, FlowRegime::Iarf), &test, &config.semilog).unwrap();
    let estimate = outcome.estimate().expect("semi-log estimate");

    assert!((estimate.permeability - 50.0).abs() / 50.0 < 0.15, "k = {}", estimate.permeability);
    assert!((estimate.skin - 5.0).abs() < 2.0, "s = {}", estimate.skin);
    let p_star = estimate.p_star.expect("Horner p*");
    assert!((p_star - 5000.0).abs() < 25.0, "p* = {p_star}");
    assert!(estimate.regression_r2 > 0.99);
}

#[test]
fn auto_match_from_semilog_seed_recovers_truth() {
    for seed in 0..10 {
        let (series, segments, test, config) = noisy_buildup(seed);
        let iarf = find(&segments, FlowRegime::Iarf);
        let outcome = semilog::analyze(&series, iarf, &test, &config.semilog).unwrap();
        let estimate = outcome.estimate().expect("semi-log estimate");
        let storage = semilog::storage_estimate(&series, find(&segments, FlowRegime::WellboreStorage), &test)
            .expect("storage estimate");
        let initial = semilog::initial_guess(estimate, storage, ModelType::HomogeneousRadial, &segments, &test);

        let matched = auto_match(&series, &initial, &segments, &test, &config.matching).unwrap();
        let p = &matched.parameters;
        assert!(matched.quality.converged, "seed {seed}: {:?}", matched.quality);
        assert!((p.permeability - 50.0).abs() / 50.0 < 0.05, "seed {seed}: k = {}", p.permeability);
        assert!((p.skin - 5.0).abs() < 0.5, "seed {seed}: s = {}", p.skin);
        assert!(matched.quality.r_squared > 0.99, "seed {seed}");
    }
}

#[test]
fn matched_parameters_feed_deliverability() {
    let (series, segments, test, config) = noisy_buildup(23);
    let outcome = semilog::analyze(&series, find(&segments, FlowRegime::Iarf), &test, &config.semilog).unwrap();
    let estimate = outcome.estimate().expect("semi-log estimate");
    let seed = semilog::initial_guess(estimate, 0.01, ModelType::HomogeneousRadial, &segments, &test);
    let matched = auto_match(&series, &seed, &segments, &test, &config.matching).unwrap();

    let settings = DeliverabilitySettings::default();
    let capacity = flow_capacity(&matched.parameters, &test, &settings).unwrap();
    assert!(capacity.flow_efficiency < 1.0);
    assert!((capacity.kh - matched.parameters.permeability * 50.0).abs() < 1e-9);

    let ipr = IprCurve::new(
        IprMethod::Darcy,
        test.fluid_type,
        capacity.productivity_index,
        test.initial_pressure,
        settings.ipr_points,
    )
    .unwrap();
    let (aof, pwf) = ipr.points().last().unwrap();
    assert_eq!(pwf, 0.0);
    assert!((aof - capacity.productivity_index * test.initial_pressure).abs() < 1e-6);

    let forecast = Forecast::new(&matched.parameters, &test, RateSchedule::constant(500.0), 720.0, 10).unwrap();
    let stimulated = forecast.stimulated().unwrap();
    assert_eq!(forecast.pressure_at(0.0), test.initial_pressure);
    assert!(stimulated.pressure_at(720.0) > forecast.pressure_at(720.0));
}
