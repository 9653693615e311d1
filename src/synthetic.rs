//! Synthetic Test Generator
//!
//! Forward-models a gauge record from known parameters: log-spaced elapsed
//! times, the model ΔP under the test's superposition, and optional additive
//! Gaussian noise from a seeded generator. Used by the demo binary and the
//! regression tests.

use rand::prelude::*;
use rand_distr::Normal;
use tracing::debug;

use crate::diagnostics::superposition_for;
use crate::error::{EngineError, EngineResult};
use crate::models::ReservoirModel;
use crate::types::{ModelParameters, Sample, TestConfig};

/// Recipe for one synthetic record
#[derive(Debug, Clone)]
pub struct SyntheticTest {
    pub params: ModelParameters,
    pub test: TestConfig,
    /// First elapsed time (hours)
    pub start_hours: f64,
    /// Last elapsed time (hours)
    pub end_hours: f64,
    /// Log-spaced samples after t = 0
    pub points: usize,
    /// Standard deviation of the pressure noise (psi); 0 disables noise
    pub noise_std: f64,
    /// `None` draws from entropy
    pub seed: Option<u64>,
}

impl SyntheticTest {
    /// Noise-free record of 400 samples over 0.01–48 h.
    pub fn new(params: ModelParameters, test: TestConfig) -> Self {
        Self {
            params,
            test,
            start_hours: 0.01,
            end_hours: 48.0,
            points: 400,
            noise_std: 0.0,
            seed: None,
        }
    }

    pub fn with_noise(mut self, noise_std: f64, seed: Option<u64>) -> Self {
        self.noise_std = noise_std;
        self.seed = seed;
        self
    }

    /// Derivative plateau α_p·qBμ/(2kh) of the radial flow regime, the
    /// natural scale for noise on a diagnostic plot.
    pub fn iarf_derivative_level(&self) -> f64 {
        0.5 * self.test.pressure_scale(self.params.permeability)
    }

    /// Log-spaced elapsed times from `start_hours` to `end_hours`.
    pub fn times(&self) -> Vec<f64> {
        if self.points < 2 {
            return vec![self.start_hours; self.points];
        }
        let a = self.start_hours.ln();
        let b = self.end_hours.ln();
        let last = (self.points - 1) as f64;
        (0..self.points)
            .map(|i| (a + (b - a) * i as f64 / last).exp())
            .collect()
    }

    /// Gauge samples, starting with the reference sample at t = 0.
    pub fn generate(&self) -> EngineResult<Vec<Sample>> {
        self.test.validate()?;
        if !(self.start_hours > 0.0) || !(self.end_hours > self.start_hours) {
            return Err(EngineError::configuration(format!(
                "synthetic time range must satisfy 0 < start < end (got {} to {})",
                self.start_hours, self.end_hours
            )));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(EngineError::configuration(format!(
                "noise standard deviation must be >= 0 (got {})",
                self.noise_std
            )));
        }

        let model = ReservoirModel::new(&self.params, &self.test)?;
        let superposition = superposition_for(&self.test);
        let times = self.times();
        let delta_p = model.delta_p_curve(&times, superposition);

        // Pressure at Δt = 0: end of the flow period for shut-in tests
        let p_ref = match self.test.horner_producing_time() {
            Some(tp) => {
                self.test.initial_pressure - self.test.test_type.production_sign() * model.drawdown(tp)
            }
            None => self.test.initial_pressure,
        };
        let direction = self.test.test_type.pressure_direction();

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, self.noise_std)
            .map_err(|e| EngineError::configuration(format!("noise distribution: {e}")))?;

        let mut samples = Vec::with_capacity(times.len() + 1);
        samples.push(Sample::new(0.0, p_ref));
        for (&t, &dp) in times.iter().zip(&delta_p) {
            let jitter = if self.noise_std > 0.0 { noise.sample(&mut rng) } else { 0.0 };
            samples.push(Sample::new(t, p_ref + direction * dp + jitter));
        }

        debug!(
            samples = samples.len(),
            test_type = %self.test.test_type,
            noise_std = self.noise_std,
            reference_pressure = p_ref,
            "Synthetic record generated"
        );
        Ok(samples)
    }
}
