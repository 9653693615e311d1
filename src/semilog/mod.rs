//! Semi-Log Analyzer
//!
//! Straight-line interpretation of the IARF interval on the semi-log plot
//! (ΔP vs ln of Horner or MDH time):
//!
//! ```text
//! m  = |slope|·ln 10                         (pressure per log cycle)
//! k  = α_semilog·qBμ / (m·h)
//! s  = 1.1513·[ΔP₁ₕ/m − log10(k/(φμct·rw²)) + offset (+ log10((tp+1)/tp) for Horner)]
//! p* = p_ref ± ΔP(ln t_H = 0)                 (Horner only)
//! ```
//!
//! The fit also reports R² and a Student's t interval on k. A regression
//! that cannot be made is a value (`InsufficientData`), not an error.

use std::collections::BTreeMap;
use std::f64::consts::LN_10;

use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, warn};

use crate::config::SemiLogSettings;
use crate::error::EngineResult;
use crate::types::{
    keys, ConfidenceInterval, DiagnosticSeries, FlowRegime, FlowRegimeSegment, ModelParameters,
    ModelType, SemiLogEstimate, SemiLogOutcome, SuperpositionKind, TestConfig,
};
use crate::units::HOURS_PER_DAY;

/// A regression line needs at least three points to carry an error estimate
const MIN_REGRESSION_POINTS: usize = 3;

/// Seed storativity ratio for a dual-porosity match
pub const SEED_OMEGA: f64 = 0.1;

/// Seed interporosity coefficient for a dual-porosity match
pub const SEED_LAMBDA: f64 = 1e-6;

/// Seed boundary radius in wellbore radii when no boundary time is known
pub const SEED_BOUNDARY_RADII: f64 = 2000.0;

/// Smallest storage a seed may carry (bbl/psi)
pub const MIN_SEED_STORAGE: f64 = 1e-6;

struct LineFit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
    slope_std_error: f64,
}

fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        sxx += (xi - mx) * (xi - mx);
        sxy += (xi - mx) * (yi - my);
        syy += (yi - my) * (yi - my);
    }
    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let ss_res: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| {
            let r = yi - (intercept + slope * xi);
            r * r
        })
        .sum();
    let r_squared = if syy > 0.0 { 1.0 - ss_res / syy } else { 1.0 };
    let slope_std_error = (ss_res / (n - 2.0) / sxx).sqrt();

    Some(LineFit {
        slope,
        intercept,
        r_squared,
        slope_std_error,
    })
}

/// Fit the semi-log straight line over the IARF segment.
///
/// `Err` only for an invalid `TestConfig`; missing or degenerate data yields
/// `SemiLogOutcome::InsufficientData`.
pub fn analyze(
    series: &DiagnosticSeries,
    iarf: Option<&FlowRegimeSegment>,
    test: &TestConfig,
    settings: &SemiLogSettings,
) -> EngineResult<SemiLogOutcome> {
    test.validate()?;

    let Some(segment) = iarf else {
        debug!("No IARF segment, semi-log analysis skipped");
        return Ok(SemiLogOutcome::InsufficientData { points: 0 });
    };

    let (x, y): (Vec<f64>, Vec<f64>) = series
        .points
        .iter()
        .filter(|p| p.elapsed_time > 0.0 && segment.contains(p.elapsed_time))
        .filter(|p| p.superposition_time.is_finite() && p.superposition_time > 0.0)
        .map(|p| (p.superposition_time.ln(), p.delta_pressure))
        .unzip();

    let needed = settings.min_points.max(MIN_REGRESSION_POINTS);
    if x.len() < needed {
        debug!(points = x.len(), needed, "Too few IARF points for a semi-log line");
        return Ok(SemiLogOutcome::InsufficientData { points: x.len() });
    }

    let Some(fit) = fit_line(&x, &y) else {
        return Ok(SemiLogOutcome::InsufficientData { points: x.len() });
    };
    let slope_per_cycle = fit.slope.abs() * LN_10;
    if !(slope_per_cycle > 0.0) || !slope_per_cycle.is_finite() {
        warn!(points = x.len(), "Flat semi-log line, permeability undefined");
        return Ok(SemiLogOutcome::InsufficientData { points: x.len() });
    }

    let constants = test.constants();
    let flow_group = constants.semilog() * test.qbmu() / test.thickness;
    let permeability = flow_group / slope_per_cycle;

    let delta_p_1h = fit.intercept + fit.slope * series.superposition.time(1.0).ln();
    let horner_term = match series.superposition {
        SuperpositionKind::Horner { producing_time } => ((producing_time + 1.0) / producing_time).log10(),
        SuperpositionKind::Mdh => 0.0,
    };
    let diffusivity = permeability
        / (test.porosity * test.viscosity * test.total_compressibility * test.wellbore_radius.powi(2));
    let skin = LN_10 / 2.0
        * (delta_p_1h / slope_per_cycle - diffusivity.log10() + constants.skin_offset() + horner_term);

    let p_star = series
        .superposition
        .is_horner()
        .then(|| series.reference_pressure + test.test_type.pressure_direction() * fit.intercept);

    let permeability_interval =
        permeability_interval(&fit, x.len(), flow_group, settings.confidence_level);

    debug!(
        permeability,
        skin,
        slope_per_cycle,
        r2 = fit.r_squared,
        points = x.len(),
        "Semi-log line fitted"
    );

    Ok(SemiLogOutcome::Estimate(SemiLogEstimate {
        permeability,
        skin,
        p_star,
        slope_per_cycle,
        delta_p_1h,
        regression_r2: fit.r_squared,
        permeability_interval,
        points_used: x.len(),
    }))
}

/// k interval from the slope's Student's t interval (k ∝ 1/m).
fn permeability_interval(
    fit: &LineFit,
    n: usize,
    flow_group: f64,
    level: f64,
) -> Option<ConfidenceInterval> {
    let df = n.checked_sub(2).filter(|&d| d > 0)? as f64;
    let t = StudentsT::new(0.0, 1.0, df).ok()?.inverse_cdf(0.5 + level / 2.0);
    let half_width = t * fit.slope_std_error * LN_10;
    let m = fit.slope.abs() * LN_10;
    let (m_low, m_high) = (m - half_width, m + half_width);
    if !(m_low > 0.0) || !half_width.is_finite() {
        return None;
    }
    Some(ConfidenceInterval {
        lower: flow_group / m_high,
        upper: flow_group / m_low,
        level,
    })
}

/// Wellbore storage coefficient from the unit-slope line, C = qB·Δt/(24·ΔP).
///
/// Averaged over the storage segment when one is given; otherwise the
/// earliest usable point gives an upper bound.
pub fn storage_estimate(
    series: &DiagnosticSeries,
    storage_segment: Option<&FlowRegimeSegment>,
    test: &TestConfig,
) -> Option<f64> {
    let qb = test.rate_magnitude() * test.formation_volume_factor;
    let usable = series
        .points
        .iter()
        .filter(|p| p.elapsed_time > 0.0 && p.delta_pressure > 0.0);

    let estimates: Vec<f64> = match storage_segment {
        Some(segment) => usable
            .filter(|p| segment.contains(p.elapsed_time))
            .map(|p| qb * p.elapsed_time / (HOURS_PER_DAY * p.delta_pressure))
            .collect(),
        None => usable
            .take(1)
            .map(|p| qb * p.elapsed_time / (HOURS_PER_DAY * p.delta_pressure))
            .collect(),
    };
    if estimates.is_empty() {
        return None;
    }
    Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
}

/// Radius of investigation r = √(4·α_t·k·t / (φμct)).
pub fn investigation_radius(test: &TestConfig, permeability: f64, hours: f64) -> f64 {
    (4.0 * test.constants().time * permeability * hours
        / (test.porosity * test.viscosity * test.total_compressibility))
        .sqrt()
}

/// Seed parameters for the optimizer from a semi-log estimate.
///
/// k and s come from the line, C from `storage`. Model-specific values:
/// ω and λ start at mid-range values, the boundary radius at the radius of
/// investigation when the boundary segment begins.
pub fn initial_guess(
    estimate: &SemiLogEstimate,
    storage: f64,
    model_type: ModelType,
    segments: &[FlowRegimeSegment],
    test: &TestConfig,
) -> ModelParameters {
    let mut model_specific = BTreeMap::new();
    match model_type {
        ModelType::HomogeneousRadial => {}
        ModelType::DualPorosity => {
            model_specific.insert(keys::OMEGA.to_string(), SEED_OMEGA);
            model_specific.insert(keys::LAMBDA.to_string(), SEED_LAMBDA);
        }
        ModelType::BoundedCircular => {
            let boundary_time = segments
                .iter()
                .find(|s| s.regime == FlowRegime::Boundary)
                .map(|s| s.start_time);
            let radius = boundary_time.map_or(SEED_BOUNDARY_RADII * test.wellbore_radius, |t| {
                investigation_radius(test, estimate.permeability, t)
            });
            model_specific.insert(
                keys::BOUNDARY_RADIUS.to_string(),
                radius.max(20.0 * test.wellbore_radius),
            );
        }
    }

    ModelParameters {
        model_type,
        permeability: estimate.permeability,
        skin: estimate.skin,
        storage: storage.max(MIN_SEED_STORAGE),
        model_specific,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagnosticSettings;
    use crate::diagnostics;
    use crate::models::ReservoirModel;
    use crate::types::{sample_config, Sample, TestType};

    fn iarf(start: f64, end: f64) -> FlowRegimeSegment {
        FlowRegimeSegment {
            regime: FlowRegime::Iarf,
            start_time: start,
            end_time: end,
            mean_slope: 0.0,
            point_count: 0,
            boundary: None,
        }
    }

    /// Noise-free buildup after 720 h at k=50, s=5, C=0.01
    fn synthetic_buildup() -> (DiagnosticSeries, TestConfig) {
        let cfg = sample_config(TestType::Buildup);
        let model = ReservoirModel::new(&ModelParameters::homogeneous(50.0, 5.0, 0.01), &cfg).unwrap();
        let horner = SuperpositionKind::Horner { producing_time: 720.0 };
        let pwf = cfg.initial_pressure - model.drawdown(720.0);

        let mut samples = vec![Sample::new(0.0, pwf)];
        for i in 0..=120 {
            let dt = 10f64.powf(-2.0 + (48f64.log10() + 2.0) * i as f64 / 120.0);
            samples.push(Sample::new(dt, pwf + model.delta_p(dt, horner)));
        }
        let series = diagnostics::compute(&samples, &cfg, &DiagnosticSettings::default()).unwrap();
        (series, cfg)
    }

    #[test]
    fn test_buildup_line_recovers_k_skin_and_p_star() {
        let (series, cfg) = synthetic_buildup();
        let outcome = analyze(&series, Some(&iarf(5.0, 48.0)), &cfg, &SemiLogSettings::default()).unwrap();
        let e = outcome.estimate().unwrap();

        assert!((e.permeability - 50.0).abs() / 50.0 < 0.03, "k = {}", e.permeability);
        assert!((e.skin - 5.0).abs() < 0.3, "s = {}", e.skin);
        // m = 162.6·qBμ/(kh)
        assert!((e.slope_per_cycle - 39.02).abs() / 39.02 < 0.03);
        let p_star = e.p_star.unwrap();
        assert!((p_star - 5000.0).abs() < 2.0, "p* = {p_star}");
        assert!(e.regression_r2 > 0.999);
        assert!(e.permeability_interval.unwrap().contains(e.permeability));
    }

    #[test]
    fn test_insufficient_points() {
        let (series, cfg) = synthetic_buildup();
        let settings = SemiLogSettings::default();

        let none = analyze(&series, None, &cfg, &settings).unwrap();
        assert_eq!(none, SemiLogOutcome::InsufficientData { points: 0 });

        let times: Vec<f64> = series.points.iter().map(|p| p.elapsed_time).filter(|&t| t > 1.0).collect();
        let empty = analyze(&series, Some(&iarf(100.0, 200.0)), &cfg, &settings).unwrap();
        assert_eq!(empty, SemiLogOutcome::InsufficientData { points: 0 });

        let one = analyze(&series, Some(&iarf(times[0], times[0])), &cfg, &settings).unwrap();
        assert_eq!(one, SemiLogOutcome::InsufficientData { points: 1 });

        let two = analyze(&series, Some(&iarf(times[0], times[1])), &cfg, &settings).unwrap();
        assert_eq!(two, SemiLogOutcome::InsufficientData { points: 2 });
    }

    #[test]
    fn test_drawdown_has_no_p_star() {
        let cfg = sample_config(TestType::Drawdown);
        let model = ReservoirModel::new(&ModelParameters::homogeneous(20.0, 0.0, 0.001), &cfg).unwrap();
        let mut samples = vec![Sample::new(0.0, cfg.initial_pressure)];
        for i in 1..=80 {
            let t = 10f64.powf(-2.0 + 4.0 * i as f64 / 80.0);
            samples.push(Sample::new(t, cfg.initial_pressure - model.drawdown(t)));
        }
        let series = diagnostics::compute(&samples, &cfg, &DiagnosticSettings::default()).unwrap();
        let outcome = analyze(&series, Some(&iarf(5.0, 100.0)), &cfg, &SemiLogSettings::default()).unwrap();
        let e = outcome.estimate().unwrap();
        assert!(e.p_star.is_none());
        assert!((e.permeability - 20.0).abs() / 20.0 < 0.03);
        assert!(e.skin.abs() < 0.3, "s = {}", e.skin);
    }

    #[test]
    fn test_storage_from_unit_slope() {
        let (series, cfg) = synthetic_buildup();
        let wbs = FlowRegimeSegment {
            regime: FlowRegime::WellboreStorage,
            start_time: 0.01,
            end_time: 0.012,
            mean_slope: 1.0,
            point_count: 2,
            boundary: None,
        };
        let c = storage_estimate(&series, Some(&wbs), &cfg).unwrap();
        // Early buildup with heavy skin is still storage dominated
        assert!((c - 0.01).abs() / 0.01 < 0.15, "C = {c}");
    }

    #[test]
    fn test_initial_guess_carries_model_keys() {
        let cfg = sample_config(TestType::Buildup);
        let estimate = SemiLogEstimate {
            permeability: 40.0,
            skin: 3.0,
            p_star: None,
            slope_per_cycle: 40.0,
            delta_p_1h: 100.0,
            regression_r2: 0.99,
            permeability_interval: None,
            points_used: 10,
        };
        let dual = initial_guess(&estimate, 0.02, ModelType::DualPorosity, &[], &cfg);
        assert_eq!(dual.get(keys::OMEGA), Some(SEED_OMEGA));
        assert!(dual.validate(cfg.wellbore_radius).is_ok());

        let bounded = initial_guess(&estimate, 0.0, ModelType::BoundedCircular, &[], &cfg);
        assert_eq!(bounded.storage, MIN_SEED_STORAGE);
        assert!(bounded.validate(cfg.wellbore_radius).is_ok());
    }
}
