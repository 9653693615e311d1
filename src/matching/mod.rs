//! Auto-Match Optimizer
//!
//! Fits a `ModelParameters` set to the diagnostic curve by minimising the
//! weighted log-space misfit of ΔP and its derivative.
//!
//! ## Architecture
//!
//! - `objective` - internal parameter space and residual vector
//! - `optimizer` - Levenberg-Marquardt with a parallel Jacobian
//! - `task` - cancellable background run with a progress event stream
//!
//! The caller always supplies the starting point (see
//! `semilog::initial_guess`); the optimizer never invents one. Failure to
//! converge is reported through `MatchQuality`, not as an error.

pub mod objective;
pub mod optimizer;
pub mod task;

pub use objective::{Objective, ParameterSpace};
pub use optimizer::{IterationReport, LevenbergMarquardt, RunEnd};
pub use task::{MatchEvent, MatchHandle, MatchRequest, MatchTask};

use tracing::{info, warn};

use crate::config::MatchSettings;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    DiagnosticSeries, FlowRegimeSegment, MatchOutcome, MatchQuality, ModelParameters, TestConfig,
};

/// Result of a match that may have been cancelled.
#[derive(Debug, Clone)]
pub enum MatchRun {
    Completed(MatchOutcome),
    /// `best` is the last improved parameter set, if any step was accepted
    Cancelled { best: Option<ModelParameters> },
}

/// Reject inputs the optimizer cannot work with.
pub fn check_request(
    series: &DiagnosticSeries,
    initial: &ModelParameters,
    test: &TestConfig,
    settings: &MatchSettings,
) -> EngineResult<()> {
    test.validate()?;
    initial.validate(test.wellbore_radius)?;
    if settings.skin_min >= settings.skin_max {
        return Err(EngineError::configuration(format!(
            "skin_min ({}) must be below skin_max ({})",
            settings.skin_min, settings.skin_max
        )));
    }

    let usable = series
        .points
        .iter()
        .filter(|p| p.elapsed_time > 0.0 && p.delta_pressure > 0.0)
        .count();
    let unknowns = 3 + initial.model_type.required_keys().len();
    if usable <= unknowns {
        return Err(EngineError::data(format!(
            "{usable} usable points cannot constrain {unknowns} parameters"
        )));
    }
    Ok(())
}

/// Fit `initial` to the series, polling `cancelled` at each iteration and
/// reporting accepted steps to `progress`.
pub fn auto_match_with<C, P>(
    series: &DiagnosticSeries,
    initial: &ModelParameters,
    segments: &[FlowRegimeSegment],
    test: &TestConfig,
    settings: &MatchSettings,
    cancelled: C,
    progress: P,
) -> EngineResult<MatchRun>
where
    C: Fn() -> bool,
    P: FnMut(IterationReport),
{
    check_request(series, initial, test, settings)?;

    let space = ParameterSpace::new(initial.model_type, test.wellbore_radius, settings);
    let objective = Objective::new(series, segments, test, settings);
    let optimizer = LevenbergMarquardt::new(&objective, &space, settings);

    let run = optimizer.run(space.encode(initial), cancelled, progress);
    let parameters = space.decode(&run.x);

    let termination = match run.end {
        RunEnd::Cancelled => {
            info!(iterations = run.iterations, improved = run.improved, "Auto-match cancelled");
            return Ok(MatchRun::Cancelled {
                best: run.improved.then_some(parameters),
            });
        }
        RunEnd::Finished(termination) => termination,
    };

    let quality = MatchQuality {
        residual_norm: run.cost.sqrt(),
        r_squared: objective.r_squared(&parameters),
        converged: termination.is_converged(),
        iterations: run.iterations,
        termination,
    };

    if quality.converged {
        info!(
            model = %parameters.model_type,
            permeability = parameters.permeability,
            skin = parameters.skin,
            storage = parameters.storage,
            iterations = quality.iterations,
            r2 = quality.r_squared,
            "Auto-match converged"
        );
    } else {
        warn!(
            termination = %termination,
            iterations = quality.iterations,
            residual = quality.residual_norm,
            "Auto-match did not converge, returning best parameters"
        );
    }

    Ok(MatchRun::Completed(MatchOutcome { parameters, quality }))
}

/// Fit without cancellation or progress reporting.
pub fn auto_match(
    series: &DiagnosticSeries,
    initial: &ModelParameters,
    segments: &[FlowRegimeSegment],
    test: &TestConfig,
    settings: &MatchSettings,
) -> EngineResult<MatchOutcome> {
    match auto_match_with(series, initial, segments, test, settings, || false, |_| {})? {
        MatchRun::Completed(outcome) => Ok(outcome),
        MatchRun::Cancelled { .. } => Err(EngineError::data("match cancelled without a cancel source")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagnosticSettings;
    use crate::diagnostics;
    use crate::models::ReservoirModel;
    use crate::synthetic::SyntheticTest;
    use crate::types::{sample_config, Sample, SuperpositionKind, Termination, TestType};

    fn synthetic_drawdown(truth: &ModelParameters) -> (DiagnosticSeries, TestConfig) {
        let cfg = sample_config(TestType::Drawdown);
        let model = ReservoirModel::new(truth, &cfg).unwrap();
        let times: Vec<f64> = (1..=80).map(|i| 10f64.powf(-2.0 + 4.0 * i as f64 / 80.0)).collect();
        let dp = model.delta_p_curve(&times, SuperpositionKind::Mdh);
        let mut samples = vec![Sample::new(0.0, cfg.initial_pressure)];
        samples.extend(times.iter().zip(&dp).map(|(&t, &d)| Sample::new(t, cfg.initial_pressure - d)));
        let series = diagnostics::compute(&samples, &cfg, &DiagnosticSettings::default()).unwrap();
        (series, cfg)
    }

    fn synthetic_buildup(truth: &ModelParameters, noise: Option<u64>) -> (DiagnosticSeries, TestConfig) {
        let cfg = sample_config(TestType::Buildup);
        let mut synthetic = SyntheticTest::new(truth.clone(), cfg.clone());
        if let Some(seed) = noise {
            let sigma = 0.01 * synthetic.iarf_derivative_level();
            synthetic = synthetic.with_noise(sigma, Some(seed));
        }
        let samples = synthetic.generate().unwrap();
        let series = diagnostics::compute(&samples, &cfg, &DiagnosticSettings::default()).unwrap();
        (series, cfg)
    }

    #[test]
    fn test_buildup_round_trip_within_one_percent() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_buildup(&truth, None);
        let seed = ModelParameters::homogeneous(52.5, 4.75, 0.0105);

        let outcome = auto_match(&series, &seed, &[], &cfg, &MatchSettings::default()).unwrap();
        let p = &outcome.parameters;
        assert!(outcome.quality.converged, "{:?}", outcome.quality);
        assert!((p.permeability - 50.0).abs() / 50.0 < 0.01, "k = {}", p.permeability);
        assert!((p.skin - 5.0).abs() / 5.0 < 0.01, "s = {}", p.skin);
        assert!((p.storage - 0.01).abs() / 0.01 < 0.01, "C = {}", p.storage);
    }

    #[test]
    fn test_noisy_buildup_from_truth_reports_converged() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        for seed in 0..6 {
            let (series, cfg) = synthetic_buildup(&truth, Some(seed));
            let outcome = auto_match(&series, &truth, &[], &cfg, &MatchSettings::default()).unwrap();
            let q = &outcome.quality;
            assert!(q.converged, "seed {seed}: {q:?}");
            assert_ne!(q.termination, Termination::Diverged, "seed {seed}");
            assert!((outcome.parameters.permeability - 50.0).abs() / 50.0 < 0.05, "seed {seed}");
        }
    }

    #[test]
    fn test_recovers_homogeneous_parameters_from_distant_seed() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_drawdown(&truth);
        let seed = ModelParameters::homogeneous(30.0, 2.0, 0.02);

        let outcome = auto_match(&series, &seed, &[], &cfg, &MatchSettings::default()).unwrap();
        let p = &outcome.parameters;
        assert!(outcome.quality.converged, "{:?}", outcome.quality);
        assert!((p.permeability - 50.0).abs() / 50.0 < 0.01, "k = {}", p.permeability);
        assert!((p.skin - 5.0).abs() < 0.05 * 5.0, "s = {}", p.skin);
        assert!((p.storage - 0.01).abs() / 0.01 < 0.01, "C = {}", p.storage);
        assert!(outcome.quality.r_squared > 0.999);
    }

    #[test]
    fn test_cancel_before_first_iteration_has_no_best() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_drawdown(&truth);
        let seed = ModelParameters::homogeneous(30.0, 2.0, 0.02);
        let run = auto_match_with(&series, &seed, &[], &cfg, &MatchSettings::default(), || true, |_| {})
            .unwrap();
        assert!(matches!(run, MatchRun::Cancelled { best: None }));
    }

    #[test]
    fn test_progress_reports_decreasing_residual() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_drawdown(&truth);
        let seed = ModelParameters::homogeneous(20.0, 0.0, 0.05);
        let mut residuals = Vec::new();
        auto_match_with(&series, &seed, &[], &cfg, &MatchSettings::default(), || false, |r| {
            residuals.push(r.residual)
        })
        .unwrap();
        assert!(!residuals.is_empty());
        assert!(residuals.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_iteration_budget_reports_not_converged() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_drawdown(&truth);
        let seed = ModelParameters::homogeneous(5.0, 20.0, 0.5);
        let settings = MatchSettings {
            max_iterations: 1,
            ..MatchSettings::default()
        };
        let outcome = auto_match(&series, &seed, &[], &cfg, &settings).unwrap();
        assert!(!outcome.quality.converged);
        assert_eq!(outcome.quality.termination, Termination::MaxIterations);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let truth = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let (series, cfg) = synthetic_drawdown(&truth);
        let seed = ModelParameters::homogeneous(-5.0, 0.0, 0.01);
        let err = auto_match(&series, &seed, &[], &cfg, &MatchSettings::default()).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
