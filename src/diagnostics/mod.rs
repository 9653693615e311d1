//! Diagnostic Engine
//!
//! Pure transform from normalized samples to the diagnostic curve:
//! - `normalize()` - sample validation, ordering and de-duplication
//! - `compute()` - ΔP, superposition time and Bourdet derivative
//! - `derivative_curve()` - the same derivative for any ΔP series
//! - `model_derivative()` - model ΔP differentiated on an observed grid
//!
//! Re-run on every change of samples, test configuration or smoothing; the
//! engine holds no state between calls.

pub mod derivative;
pub mod normalizer;

pub use derivative::bourdet;
pub use normalizer::normalize;

use tracing::{debug, warn};

use crate::config::DiagnosticSettings;
use crate::error::{EngineError, EngineResult};
use crate::types::{DiagnosticPoint, DiagnosticSeries, Sample, SuperpositionKind, TestConfig};

/// Choose the superposition function for a test.
///
/// Horner time needs a finite producing time on a shut-in test; anything
/// else falls back to MDH.
pub fn superposition_for(test: &TestConfig) -> SuperpositionKind {
    match test.horner_producing_time() {
        Some(producing_time) => SuperpositionKind::Horner { producing_time },
        None => {
            if test.test_type.is_shut_in() {
                warn!(
                    test_type = %test.test_type,
                    "No producing time for shut-in test, using MDH time"
                );
            }
            SuperpositionKind::Mdh
        }
    }
}

/// Pressure at Δt = 0.
///
/// Order: a sample at t = 0, the configured reference pressure, and for
/// flowing tests the initial reservoir pressure.
pub fn reference_pressure(samples: &[Sample], test: &TestConfig) -> EngineResult<f64> {
    if let Some(first) = samples.iter().find(|s| s.time == 0.0) {
        return Ok(first.pressure);
    }
    if let Some(p) = test.reference_pressure {
        return Ok(p);
    }
    if !test.test_type.is_shut_in() {
        return Ok(test.initial_pressure);
    }
    Err(EngineError::data(format!(
        "{} test needs the pressure at shut-in: supply a sample at t = 0 or reference_pressure",
        test.test_type
    )))
}

/// Build the diagnostic curve.
///
/// Samples are normalized first; the returned series keeps every sample,
/// including those whose derivative is undefined.
pub fn compute(
    samples: &[Sample],
    test: &TestConfig,
    settings: &DiagnosticSettings,
) -> EngineResult<DiagnosticSeries> {
    test.validate()?;
    if !settings.smoothing.is_finite() || settings.smoothing <= 0.0 {
        return Err(EngineError::configuration(format!(
            "smoothing L must be > 0 (got {})",
            settings.smoothing
        )));
    }

    let samples = normalize(samples, settings.min_samples)?;
    let superposition = superposition_for(test);
    let p_ref = reference_pressure(&samples, test)?;

    let elapsed: Vec<f64> = samples.iter().map(|s| s.time).collect();
    let delta_p: Vec<f64> = samples.iter().map(|s| (s.pressure - p_ref).abs()).collect();
    let derivative = derivative_curve(
        &elapsed,
        &delta_p,
        superposition,
        settings.smoothing,
        settings.early_time_cutoff_hours,
    );

    let points: Vec<DiagnosticPoint> = samples
        .iter()
        .zip(delta_p.iter().zip(derivative))
        .map(|(s, (&dp, d))| DiagnosticPoint {
            elapsed_time: s.time,
            // Horner time is +∞ at Δt = 0
            superposition_time: superposition.time(s.time),
            pressure: s.pressure,
            delta_pressure: dp,
            derivative: d,
        })
        .collect();

    let defined = points.iter().filter(|p| p.derivative.is_some()).count();
    debug!(
        samples = points.len(),
        derivative_points = defined,
        reference_pressure = p_ref,
        horner = superposition.is_horner(),
        "Diagnostic curve computed"
    );

    Ok(DiagnosticSeries {
        points,
        superposition,
        reference_pressure: p_ref,
        smoothing: settings.smoothing,
    })
}

/// Bourdet derivative of a ΔP series against ln of the equivalent time.
///
/// Points with Δt ≤ 0, ΔP ≤ 0 or non-finite values cannot be log-plotted and
/// are excluded; points before `early_time_cutoff` keep their place as
/// neighbors but report no derivative.
pub fn derivative_curve(
    elapsed: &[f64],
    delta_p: &[f64],
    superposition: SuperpositionKind,
    smoothing: f64,
    early_time_cutoff: f64,
) -> Vec<Option<f64>> {
    let usable: Vec<bool> = elapsed
        .iter()
        .zip(delta_p)
        .map(|(&t, &dp)| t > 0.0 && dp > 0.0 && dp.is_finite())
        .collect();
    let x: Vec<f64> = elapsed
        .iter()
        .map(|&t| {
            if t > 0.0 {
                superposition.equivalent_time(t).ln()
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect();

    let mut derivative = bourdet(&x, delta_p, &usable, smoothing);
    for (d, &t) in derivative.iter_mut().zip(elapsed) {
        if t < early_time_cutoff {
            *d = None;
        }
    }
    derivative
}

/// Derivative of a model ΔP curve sampled on an observed series' grid.
///
/// Neighbor selection skips the same points the observed derivative skipped,
/// and the result is defined only where the observed derivative is.
pub fn model_derivative(series: &DiagnosticSeries, model_delta_p: &[f64]) -> Vec<Option<f64>> {
    let usable: Vec<bool> = series
        .points
        .iter()
        .zip(model_delta_p)
        .map(|(p, &m)| p.elapsed_time > 0.0 && p.delta_pressure > 0.0 && m > 0.0 && m.is_finite())
        .collect();
    let x: Vec<f64> = series
        .points
        .iter()
        .map(|p| {
            if p.elapsed_time > 0.0 {
                series.superposition.equivalent_time(p.elapsed_time).ln()
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect();

    bourdet(&x, model_delta_p, &usable, series.smoothing)
        .into_iter()
        .zip(&series.points)
        .map(|(d, p)| if p.derivative.is_some() { d } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sample_config, TestType};

    fn settings() -> DiagnosticSettings {
        DiagnosticSettings::default()
    }

    /// ΔP = a·ln(t) + b in drawdown → derivative = a everywhere inside the data
    fn semilog_drawdown(a: f64) -> Vec<Sample> {
        let mut samples = vec![Sample::new(0.0, 5000.0)];
        for i in 0..60 {
            let t = 10f64.powf(-2.0 + 4.0 * i as f64 / 59.0);
            samples.push(Sample::new(t, 5000.0 - (a * t.ln() + 100.0)));
        }
        samples
    }

    #[test]
    fn test_drawdown_semilog_line_has_flat_derivative() {
        let series = compute(&semilog_drawdown(20.0), &sample_config(TestType::Drawdown), &settings())
            .unwrap();
        assert_eq!(series.superposition, SuperpositionKind::Mdh);
        assert_eq!(series.reference_pressure, 5000.0);
        for p in series.points.iter().filter(|p| p.derivative.is_some()) {
            assert!((p.derivative.unwrap() - 20.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_time_point_retained_without_derivative() {
        let series = compute(&semilog_drawdown(20.0), &sample_config(TestType::Drawdown), &settings())
            .unwrap();
        assert_eq!(series.points[0].elapsed_time, 0.0);
        assert_eq!(series.points[0].delta_pressure, 0.0);
        assert!(series.points[0].derivative.is_none());
    }

    #[test]
    fn test_early_time_cutoff_marks_derivative_undefined() {
        let mut samples = vec![Sample::new(0.0, 5000.0)];
        for i in 1..=40 {
            let t = 1e-4 * 1.3f64.powi(i);
            samples.push(Sample::new(t, 5000.0 - 10.0 * (1.0 + t)));
        }
        let series = compute(&samples, &sample_config(TestType::Drawdown), &settings()).unwrap();
        for p in &series.points {
            if p.elapsed_time < 0.001 {
                assert!(p.derivative.is_none(), "t={} should be cut", p.elapsed_time);
            }
        }
        assert!(series.points.iter().any(|p| p.derivative.is_some()));
    }

    #[test]
    fn test_buildup_uses_horner_time() {
        let cfg = sample_config(TestType::Buildup);
        let mut samples = vec![Sample::new(0.0, 3000.0)];
        for i in 1..=30 {
            samples.push(Sample::new(i as f64 * 0.5, 3000.0 + 10.0 * i as f64));
        }
        let series = compute(&samples, &cfg, &settings()).unwrap();
        assert!(series.superposition.is_horner());
        let p = &series.points[2];
        assert!((p.superposition_time - (720.0 + 1.0) / 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_buildup_without_reference_is_data_error() {
        let cfg = sample_config(TestType::Buildup);
        let samples: Vec<Sample> = (1..=10).map(|i| Sample::new(i as f64, 3000.0 + i as f64)).collect();
        let err = compute(&samples, &cfg, &settings()).unwrap_err();
        assert!(matches!(err, EngineError::Data(_)));
    }

    #[test]
    fn test_flat_pressure_excluded_from_derivative() {
        let cfg = sample_config(TestType::Drawdown);
        let samples: Vec<Sample> = (0..10).map(|i| Sample::new(i as f64, 5000.0)).collect();
        let series = compute(&samples, &cfg, &settings()).unwrap();
        assert_eq!(series.points.len(), 10);
        assert!(series.points.iter().all(|p| p.derivative.is_none()));
    }
}
