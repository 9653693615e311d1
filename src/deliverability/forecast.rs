//! Pressure forecast from a matched model
//!
//! Superposes the model's constant-rate response over a piecewise-constant
//! rate schedule, starting from the initial pressure:
//!
//! ```text
//! p(t) = pi − sign · Σ_j (q_j − q_(j−1)) · Δp_unit(t − t_j)
//! ```
//!
//! Rates are magnitudes in the sense of the test's flow period (withdrawal
//! for drawdown/buildup, injection for injection/falloff); a zero rate is a
//! shut-in.

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::ReservoirModel;
use crate::types::{ModelParameters, TestConfig};

/// One constant-rate period starting at `start` (hours)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateStep {
    pub start: f64,
    pub rate: f64,
}

/// Piecewise-constant rate history beginning at t = 0
#[derive(Debug, Clone, PartialEq)]
pub struct RateSchedule {
    steps: Vec<RateStep>,
}

impl RateSchedule {
    /// A single target rate held from t = 0.
    pub fn constant(rate: f64) -> Self {
        Self {
            steps: vec![RateStep { start: 0.0, rate }],
        }
    }

    /// Steps must start at t = 0, with strictly increasing start times and
    /// finite non-negative rates.
    pub fn new(steps: Vec<RateStep>) -> EngineResult<Self> {
        let Some(first) = steps.first() else {
            return Err(EngineError::configuration("rate schedule is empty"));
        };
        if first.start != 0.0 {
            return Err(EngineError::configuration(format!(
                "rate schedule must start at t = 0 (first step at {})",
                first.start
            )));
        }
        if let Some(step) = steps.iter().find(|s| !s.rate.is_finite() || s.rate < 0.0) {
            return Err(EngineError::configuration(format!(
                "schedule rates must be finite and >= 0 (got {} at t = {})",
                step.rate, step.start
            )));
        }
        if steps.windows(2).any(|w| !(w[1].start > w[0].start) || !w[1].start.is_finite()) {
            return Err(EngineError::configuration(
                "rate schedule start times must be strictly increasing",
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[RateStep] {
        &self.steps
    }
}

/// Forecast for one parameter set, schedule and horizon.
#[derive(Debug, Clone)]
pub struct Forecast {
    params: ModelParameters,
    test: TestConfig,
    model: ReservoirModel,
    schedule: RateSchedule,
    horizon: f64,
    steps: usize,
}

impl Forecast {
    /// `steps` time intervals over `horizon` hours; the series has
    /// `steps + 1` points including t = 0.
    pub fn new(
        params: &ModelParameters,
        test: &TestConfig,
        schedule: RateSchedule,
        horizon: f64,
        steps: usize,
    ) -> EngineResult<Self> {
        test.validate()?;
        if !(horizon > 0.0) || !horizon.is_finite() {
            return Err(EngineError::configuration(format!(
                "forecast horizon must be > 0 hours (got {horizon})"
            )));
        }
        if steps == 0 {
            return Err(EngineError::configuration("forecast needs at least one time step"));
        }
        let model = ReservoirModel::new(params, test)?;
        debug!(
            model = %params.model_type,
            horizon,
            steps,
            periods = schedule.steps.len(),
            "Forecast prepared"
        );
        Ok(Self {
            params: params.clone(),
            test: test.clone(),
            model,
            schedule,
            horizon,
            steps,
        })
    }

    /// Same schedule and horizon with the skin removed.
    pub fn stimulated(&self) -> EngineResult<Self> {
        Self::new(
            &self.params.with_skin(0.0),
            &self.test,
            self.schedule.clone(),
            self.horizon,
            self.steps,
        )
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    /// Bottomhole pressure at `t` hours. Exactly `initial_pressure` at t ≤ 0.
    pub fn pressure_at(&self, t: f64) -> f64 {
        if !(t > 0.0) {
            return self.test.initial_pressure;
        }
        let rate_magnitude = self.test.rate_magnitude();
        let mut previous = 0.0;
        let mut drop = 0.0;
        for step in self.schedule.steps.iter().take_while(|s| s.start < t) {
            let change = step.rate - previous;
            if change != 0.0 {
                drop += change * self.model.unit_rate_drawdown(t - step.start, rate_magnitude);
            }
            previous = step.rate;
        }
        self.test.initial_pressure - self.test.test_type.production_sign() * drop
    }

    /// (time, pressure) pairs at i·horizon/steps for i = 0..=steps.
    pub fn points(&self) -> ForecastPoints<'_> {
        ForecastPoints {
            forecast: self,
            next: 0,
        }
    }
}

/// Iterator over a `Forecast`
#[derive(Debug, Clone)]
pub struct ForecastPoints<'a> {
    forecast: &'a Forecast,
    next: usize,
}

impl Iterator for ForecastPoints<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.forecast.steps {
            return None;
        }
        let t = if self.next == 0 {
            0.0
        } else {
            self.forecast.horizon * self.next as f64 / self.forecast.steps as f64
        };
        self.next += 1;
        Some((t, self.forecast.pressure_at(t)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.forecast.steps + 1).saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ForecastPoints<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sample_config, TestType};

    fn forecast(params: &ModelParameters, schedule: RateSchedule) -> Forecast {
        Forecast::new(params, &sample_config(TestType::Drawdown), schedule, 240.0, 24).unwrap()
    }

    #[test]
    fn test_time_zero_is_initial_pressure() {
        let cfg = sample_config(TestType::Drawdown);
        let f = forecast(&ModelParameters::homogeneous(50.0, 5.0, 0.01), RateSchedule::constant(800.0));
        assert_eq!(f.pressure_at(0.0), cfg.initial_pressure);
        assert_eq!(f.points().next(), Some((0.0, cfg.initial_pressure)));
    }

    #[test]
    fn test_constant_rate_declines_monotonically() {
        let f = forecast(&ModelParameters::homogeneous(50.0, 5.0, 0.01), RateSchedule::constant(800.0));
        let points: Vec<(f64, f64)> = f.points().collect();
        assert_eq!(points.len(), 25);
        assert!(points.windows(2).all(|w| w[1].1 < w[0].1));
        assert!((points[24].0 - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_test_rate_matches_model_drawdown() {
        let cfg = sample_config(TestType::Drawdown);
        let params = ModelParameters::homogeneous(50.0, 5.0, 0.01);
        let f = forecast(&params, RateSchedule::constant(cfg.rate_magnitude()));
        let model = ReservoirModel::new(&params, &cfg).unwrap();
        let expected = cfg.initial_pressure - model.drawdown(48.0);
        assert!((f.pressure_at(48.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_stimulated_scenario_holds_more_pressure() {
        let f = forecast(&ModelParameters::homogeneous(50.0, 5.0, 0.01), RateSchedule::constant(800.0));
        let stimulated = f.stimulated().unwrap();
        assert_eq!(stimulated.parameters().skin, 0.0);
        assert!(stimulated.pressure_at(100.0) > f.pressure_at(100.0));
    }

    #[test]
    fn test_shut_in_recovers_pressure() {
        let schedule = RateSchedule::new(vec![
            RateStep { start: 0.0, rate: 800.0 },
            RateStep { start: 100.0, rate: 0.0 },
        ])
        .unwrap();
        let f = forecast(&ModelParameters::homogeneous(50.0, 5.0, 0.01), schedule);
        let at_shut_in = f.pressure_at(100.0);
        assert!(f.pressure_at(110.0) > at_shut_in);
        assert!(f.pressure_at(240.0) > f.pressure_at(110.0));
        assert!(f.pressure_at(240.0) < sample_config(TestType::Drawdown).initial_pressure);
    }

    #[test]
    fn test_invalid_schedules_rejected() {
        assert!(RateSchedule::new(Vec::new()).is_err());
        assert!(RateSchedule::new(vec![RateStep { start: 5.0, rate: 100.0 }]).is_err());
        assert!(RateSchedule::new(vec![
            RateStep { start: 0.0, rate: 100.0 },
            RateStep { start: 0.0, rate: 50.0 },
        ])
        .is_err());
        assert!(RateSchedule::new(vec![RateStep { start: 0.0, rate: -1.0 }]).is_err());
    }

    #[test]
    fn test_points_are_restartable() {
        let f = forecast(&ModelParameters::homogeneous(50.0, 0.0, 0.01), RateSchedule::constant(500.0));
        let a: Vec<(f64, f64)> = f.points().collect();
        let b: Vec<(f64, f64)> = f.points().collect();
        assert_eq!(a, b);
    }
}
