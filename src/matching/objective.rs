//! Match objective: internal parameter space and weighted residuals
//!
//! The optimizer works on unconstrained internal coordinates so that every
//! trial step decodes to a physically valid parameter set:
//!
//! | Parameter | Internal        | Decoded range            |
//! |-----------|-----------------|--------------------------|
//! | k         | ln k            | (0, ∞)                   |
//! | s         | s               | clamped [skin_min, skin_max] |
//! | C         | ln C            | (0, ∞), seeded ≥ 1e-6    |
//! | ω         | logit ω         | (0, 1)                   |
//! | λ         | ln λ            | (0, 1)                   |
//! | re        | ln(re/rw)       | > 10·rw                  |

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::config::MatchSettings;
use crate::diagnostics::model_derivative;
use crate::models::ReservoirModel;
use crate::types::{
    keys, DiagnosticSeries, FlowRegime, FlowRegimeSegment, ModelParameters, ModelType, TestConfig,
};

/// Storage floor applied when encoding a seed (bbl/psi)
pub const MIN_STORAGE: f64 = 1e-6;

/// Floor, relative to the observation, for model values that cannot be logged
const LOG_FLOOR: f64 = 1e-6;

const LN_K_RANGE: (f64, f64) = (-16.0, 16.0);
const LN_C_RANGE: (f64, f64) = (-25.0, 8.0);
const LOGIT_RANGE: (f64, f64) = (-25.0, 25.0);
const LN_LAMBDA_RANGE: (f64, f64) = (-30.0, -1e-3);
/// ln(10.5): keeps reD above the validation limit of 10
const LN_RED_MIN: f64 = 2.351_375;
const LN_RED_MAX: f64 = 16.0;

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Mapping between `ModelParameters` and the optimizer's coordinates.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    model_type: ModelType,
    wellbore_radius: f64,
    skin_range: (f64, f64),
}

impl ParameterSpace {
    pub fn new(model_type: ModelType, wellbore_radius: f64, settings: &MatchSettings) -> Self {
        Self {
            model_type,
            wellbore_radius,
            skin_range: (settings.skin_min, settings.skin_max),
        }
    }

    pub fn dimension(&self) -> usize {
        3 + self.model_type.required_keys().len()
    }

    pub fn encode(&self, params: &ModelParameters) -> DVector<f64> {
        let mut x = vec![
            params.permeability.ln(),
            params.skin.clamp(self.skin_range.0, self.skin_range.1),
            params.storage.max(MIN_STORAGE).ln(),
        ];
        match self.model_type {
            ModelType::HomogeneousRadial => {}
            ModelType::DualPorosity => {
                x.push(logit(params.get(keys::OMEGA).unwrap_or(0.1)));
                x.push(params.get(keys::LAMBDA).unwrap_or(1e-6).ln());
            }
            ModelType::BoundedCircular => {
                let re = params
                    .get(keys::BOUNDARY_RADIUS)
                    .unwrap_or(1000.0 * self.wellbore_radius);
                x.push((re / self.wellbore_radius).ln());
            }
        }
        self.clamp(DVector::from_vec(x))
    }

    /// Project internal coordinates onto the admissible box.
    pub fn clamp(&self, mut x: DVector<f64>) -> DVector<f64> {
        x[0] = x[0].clamp(LN_K_RANGE.0, LN_K_RANGE.1);
        x[1] = x[1].clamp(self.skin_range.0, self.skin_range.1);
        x[2] = x[2].clamp(LN_C_RANGE.0, LN_C_RANGE.1);
        match self.model_type {
            ModelType::HomogeneousRadial => {}
            ModelType::DualPorosity => {
                x[3] = x[3].clamp(LOGIT_RANGE.0, LOGIT_RANGE.1);
                x[4] = x[4].clamp(LN_LAMBDA_RANGE.0, LN_LAMBDA_RANGE.1);
            }
            ModelType::BoundedCircular => {
                x[3] = x[3].clamp(LN_RED_MIN, LN_RED_MAX);
            }
        }
        x
    }

    pub fn decode(&self, x: &DVector<f64>) -> ModelParameters {
        let x = self.clamp(x.clone());
        let mut model_specific = BTreeMap::new();
        match self.model_type {
            ModelType::HomogeneousRadial => {}
            ModelType::DualPorosity => {
                model_specific.insert(keys::OMEGA.to_string(), sigmoid(x[3]));
                model_specific.insert(keys::LAMBDA.to_string(), x[4].exp());
            }
            ModelType::BoundedCircular => {
                model_specific.insert(
                    keys::BOUNDARY_RADIUS.to_string(),
                    x[3].exp() * self.wellbore_radius,
                );
            }
        }
        ModelParameters {
            model_type: self.model_type,
            permeability: x[0].exp(),
            skin: x[1],
            storage: x[2].exp(),
            model_specific,
        }
    }
}

/// Weighted log-space misfit of the ΔP and derivative curves.
///
/// ```text
/// Σ wᵢ·[ wd·(ln d_model − ln d_obs)² + (ln ΔP_model − ln ΔP_obs)² ]
/// ```
pub struct Objective<'a> {
    series: &'a DiagnosticSeries,
    test: &'a TestConfig,
    elapsed: Vec<f64>,
    /// (point index, √w, ln ΔP_obs)
    pressure_terms: Vec<(usize, f64, f64)>,
    /// (point index, √(w·wd), ln d_obs)
    derivative_terms: Vec<(usize, f64, f64)>,
}

impl<'a> Objective<'a> {
    pub fn new(
        series: &'a DiagnosticSeries,
        segments: &[FlowRegimeSegment],
        test: &'a TestConfig,
        settings: &MatchSettings,
    ) -> Self {
        let weights = point_weights(series, segments, settings);
        let wd = settings.derivative_weight.max(0.0);

        let pressure_terms = series
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.elapsed_time > 0.0 && p.delta_pressure > 0.0)
            .map(|(i, p)| (i, weights[i].sqrt(), p.delta_pressure.ln()))
            .collect();
        let derivative_terms = if wd > 0.0 {
            series
                .points
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_log_plottable())
                .filter_map(|(i, p)| p.derivative.map(|d| (i, (weights[i] * wd).sqrt(), d.ln())))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            series,
            test,
            elapsed: series.elapsed_times(),
            pressure_terms,
            derivative_terms,
        }
    }

    /// Number of residual terms.
    pub fn len(&self) -> usize {
        self.pressure_terms.len() + self.derivative_terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Model ΔP on the observed grid; `None` when the parameters are rejected.
    pub fn model_curve(&self, params: &ModelParameters) -> Option<Vec<f64>> {
        let model = ReservoirModel::new(params, self.test).ok()?;
        Some(model.delta_p_curve(&self.elapsed, self.series.superposition))
    }

    /// Weighted residual vector; `None` for rejected parameters or a
    /// non-finite model response.
    pub fn residuals(&self, params: &ModelParameters) -> Option<DVector<f64>> {
        let dp = self.model_curve(params)?;
        let derivative = if self.derivative_terms.is_empty() {
            Vec::new()
        } else {
            model_derivative(self.series, &dp)
        };

        let mut r = Vec::with_capacity(self.len());
        for &(i, sw, ln_obs) in &self.pressure_terms {
            r.push(sw * (log_floored(dp[i], ln_obs) - ln_obs));
        }
        for &(i, sw, ln_obs) in &self.derivative_terms {
            let model = derivative.get(i).copied().flatten().unwrap_or(0.0);
            r.push(sw * (log_floored(model, ln_obs) - ln_obs));
        }

        let r = DVector::from_vec(r);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    /// Coefficient of determination of the model ΔP against the observed ΔP.
    pub fn r_squared(&self, params: &ModelParameters) -> f64 {
        let Some(dp) = self.model_curve(params) else {
            return 0.0;
        };
        let observed: Vec<(f64, f64)> = self
            .pressure_terms
            .iter()
            .map(|&(i, _, _)| (self.series.points[i].delta_pressure, dp[i]))
            .collect();
        if observed.is_empty() {
            return 0.0;
        }
        let mean = observed.iter().map(|(o, _)| o).sum::<f64>() / observed.len() as f64;
        let ss_tot: f64 = observed.iter().map(|(o, _)| (o - mean).powi(2)).sum();
        let ss_res: f64 = observed.iter().map(|(o, m)| (o - m).powi(2)).sum();
        if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            0.0
        }
    }
}

/// ln(value), with non-positive model values pinned to a small fraction of
/// the observation so the residual stays finite.
fn log_floored(value: f64, ln_obs: f64) -> f64 {
    let floor = ln_obs + LOG_FLOOR.ln();
    if value > 0.0 && value.is_finite() {
        value.ln().max(floor)
    } else {
        floor
    }
}

/// Per-point weights: `iarf_weight` inside the IARF segment, `early_weight`
/// over the first `early_fraction` of the log-time span, 1 elsewhere.
pub fn point_weights(
    series: &DiagnosticSeries,
    segments: &[FlowRegimeSegment],
    settings: &MatchSettings,
) -> Vec<f64> {
    let iarf = segments.iter().find(|s| s.regime == FlowRegime::Iarf);
    let positive: Vec<f64> = series
        .points
        .iter()
        .map(|p| p.elapsed_time)
        .filter(|&t| t > 0.0)
        .collect();
    let early_limit = match (positive.first(), positive.last()) {
        (Some(&first), Some(&last)) => {
            let (a, b) = (first.ln(), last.ln());
            Some((a + settings.early_fraction * (b - a)).exp())
        }
        _ => None,
    };

    series
        .points
        .iter()
        .map(|p| {
            if iarf.is_some_and(|s| s.contains(p.elapsed_time)) {
                settings.iarf_weight
            } else if early_limit.is_some_and(|limit| p.elapsed_time < limit) {
                settings.early_weight
            } else {
                1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiagnosticPoint, SuperpositionKind};

    fn series(times: &[f64]) -> DiagnosticSeries {
        DiagnosticSeries {
            points: times
                .iter()
                .map(|&t| DiagnosticPoint {
                    elapsed_time: t,
                    superposition_time: t,
                    pressure: 4000.0,
                    delta_pressure: 10.0,
                    derivative: Some(1.0),
                })
                .collect(),
            superposition: SuperpositionKind::Mdh,
            reference_pressure: 4010.0,
            smoothing: 0.2,
        }
    }

    #[test]
    fn test_parameter_space_round_trip() {
        let space = ParameterSpace::new(ModelType::DualPorosity, 0.35, &MatchSettings::default());
        let params = ModelParameters::dual_porosity(25.0, 2.5, 0.02, 0.07, 3e-7);
        let decoded = space.decode(&space.encode(&params));
        assert!((decoded.permeability - 25.0).abs() < 1e-9);
        assert!((decoded.skin - 2.5).abs() < 1e-12);
        assert!((decoded.get(keys::OMEGA).unwrap() - 0.07).abs() < 1e-12);
        assert!((decoded.get(keys::LAMBDA).unwrap() - 3e-7).abs() < 1e-18);
        assert_eq!(space.dimension(), 5);
    }

    #[test]
    fn test_decode_clamps_into_valid_region() {
        let settings = MatchSettings::default();
        let space = ParameterSpace::new(ModelType::BoundedCircular, 0.35, &settings);
        let x = DVector::from_vec(vec![3.0, 500.0, -4.0, -50.0]);
        let params = space.decode(&x);
        assert_eq!(params.skin, settings.skin_max);
        assert!(params.validate(0.35).is_ok());
    }

    #[test]
    fn test_zero_storage_seed_is_floored() {
        let space = ParameterSpace::new(ModelType::HomogeneousRadial, 0.35, &MatchSettings::default());
        let x = space.encode(&ModelParameters::homogeneous(10.0, 0.0, 0.0));
        assert!((x[2] - MIN_STORAGE.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_weights_favour_iarf_and_discount_early_time() {
        let times: Vec<f64> = (0..=40).map(|i| 10f64.powf(-2.0 + 0.1 * i as f64)).collect();
        let s = series(&times);
        let iarf = FlowRegimeSegment {
            regime: FlowRegime::Iarf,
            start_time: 1.0,
            end_time: 10.0,
            mean_slope: 0.0,
            point_count: 11,
            boundary: None,
        };
        let w = point_weights(&s, &[iarf], &MatchSettings::default());
        assert_eq!(w[0], 0.5);
        assert_eq!(w[25], 2.0);
        assert_eq!(w[40], 1.0);
    }

    #[test]
    fn test_log_floor_keeps_residual_finite() {
        let ln_obs = 10f64.ln();
        assert!(log_floored(-3.0, ln_obs).is_finite());
        assert!((log_floored(10.0, ln_obs) - ln_obs).abs() < 1e-12);
    }
}
