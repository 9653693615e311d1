//! Input types: Sample and TestConfig

use serde::{Deserialize, Serialize};

use super::{FluidType, TestType};
use crate::error::{EngineError, EngineResult};
use crate::units::{UnitConstants, UnitSystem};

/// One gauge reading handed over by the ingestion layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Elapsed time since the start of the analysed period (hours).
    /// For shut-in tests this is Δt since shut-in.
    pub time: f64,
    /// Bottomhole pressure (psia / kPa)
    pub pressure: f64,
    /// Surface rate, when recorded (STB/D / m³/d)
    #[serde(default)]
    pub rate: Option<f64>,
}

impl Sample {
    pub fn new(time: f64, pressure: f64) -> Self {
        Self {
            time,
            pressure,
            rate: None,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// Test and rock/fluid description for one analysis session.
///
/// Treated as an immutable value: an edit produces a new `TestConfig` and
/// every derived result must be recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub test_type: TestType,
    #[serde(default)]
    pub fluid_type: FluidType,
    #[serde(default)]
    pub unit_system: UnitSystem,
    /// Porosity φ (fraction)
    pub porosity: f64,
    /// Total compressibility ct (1/psi)
    pub total_compressibility: f64,
    /// Wellbore radius rw (ft)
    pub wellbore_radius: f64,
    /// Net thickness h (ft)
    pub thickness: f64,
    /// Initial reservoir pressure pi (psia)
    pub initial_pressure: f64,
    /// Producing time before shut-in tp (hours); needed for Horner time
    #[serde(default)]
    pub producing_time: Option<f64>,
    /// Rate of the flow period that created the transient (STB/D)
    pub rate: f64,
    /// Formation volume factor B (RB/STB)
    pub formation_volume_factor: f64,
    /// Viscosity μ (cp)
    pub viscosity: f64,
    /// Pressure at Δt = 0 when the sample set does not contain it
    #[serde(default)]
    pub reference_pressure: Option<f64>,
}

impl TestConfig {
    /// Reject physically meaningless configurations before any computation.
    pub fn validate(&self) -> EngineResult<()> {
        let mut errors: Vec<String> = Vec::new();

        Self::check_positive(self.porosity, "porosity", &mut errors);
        if self.porosity >= 1.0 {
            errors.push(format!("porosity ({:.3}) must be < 1", self.porosity));
        }
        Self::check_positive(self.total_compressibility, "total_compressibility", &mut errors);
        Self::check_positive(self.wellbore_radius, "wellbore_radius", &mut errors);
        Self::check_positive(self.thickness, "thickness", &mut errors);
        Self::check_positive(self.initial_pressure, "initial_pressure", &mut errors);
        Self::check_positive(self.formation_volume_factor, "formation_volume_factor", &mut errors);
        Self::check_positive(self.viscosity, "viscosity", &mut errors);

        if !self.rate.is_finite() || self.rate == 0.0 {
            errors.push(format!("rate must be finite and non-zero (got {})", self.rate));
        }
        if let Some(tp) = self.producing_time {
            if !tp.is_finite() || tp <= 0.0 {
                errors.push(format!("producing_time must be > 0 when given (got {tp})"));
            }
        }
        if let Some(p) = self.reference_pressure {
            if !p.is_finite() || p <= 0.0 {
                errors.push(format!("reference_pressure must be > 0 when given (got {p})"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::configuration(errors.join("; ")))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be finite and > 0 (got {value})"));
        }
    }

    pub fn constants(&self) -> UnitConstants {
        self.unit_system.constants()
    }

    /// Producing time usable for Horner superposition, if any.
    pub fn horner_producing_time(&self) -> Option<f64> {
        if !self.test_type.is_shut_in() {
            return None;
        }
        self.producing_time.filter(|tp| tp.is_finite() && *tp > 0.0)
    }

    /// Magnitude of the flow-period rate.
    pub fn rate_magnitude(&self) -> f64 {
        self.rate.abs()
    }

    /// q·B·μ with the rate magnitude.
    pub fn qbmu(&self) -> f64 {
        self.rate_magnitude() * self.formation_volume_factor * self.viscosity
    }

    /// Dimensionless time per hour for permeability `k`.
    pub fn td_per_hour(&self, permeability: f64) -> f64 {
        self.constants().time * permeability
            / (self.porosity
                * self.viscosity
                * self.total_compressibility
                * self.wellbore_radius
                * self.wellbore_radius)
    }

    /// Dimensionless wellbore storage for storage coefficient `c`.
    pub fn dimensionless_storage(&self, storage: f64) -> f64 {
        self.constants().storage * storage
            / (self.porosity
                * self.total_compressibility
                * self.thickness
                * self.wellbore_radius
                * self.wellbore_radius)
    }

    /// Pressure per unit pD for permeability `k` at the configured rate.
    pub fn pressure_scale(&self, permeability: f64) -> f64 {
        self.constants().pressure * self.qbmu() / (permeability * self.thickness)
    }
}

#[cfg(test)]
pub(crate) fn sample_config(test_type: TestType) -> TestConfig {
    TestConfig {
        test_type,
        fluid_type: FluidType::Oil,
        unit_system: UnitSystem::Field,
        porosity: 0.2,
        total_compressibility: 3e-6,
        wellbore_radius: 0.35,
        thickness: 50.0,
        initial_pressure: 5000.0,
        producing_time: if test_type.is_shut_in() { Some(720.0) } else { None },
        rate: 500.0,
        formation_volume_factor: 1.2,
        viscosity: 1.0,
        reference_pressure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config(TestType::Buildup).validate().is_ok());
    }

    #[test]
    fn test_negative_porosity_rejected() {
        let mut cfg = sample_config(TestType::Drawdown);
        cfg.porosity = -0.1;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(ref m) if m.contains("porosity")));
    }

    #[test]
    fn test_nan_compressibility_rejected() {
        let mut cfg = sample_config(TestType::Drawdown);
        cfg.total_compressibility = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_horner_time_only_for_shut_in() {
        let mut cfg = sample_config(TestType::Drawdown);
        cfg.producing_time = Some(100.0);
        assert_eq!(cfg.horner_producing_time(), None);
        assert_eq!(sample_config(TestType::Buildup).horner_producing_time(), Some(720.0));
    }

    #[test]
    fn test_dimensionless_groups_field_units() {
        let cfg = sample_config(TestType::Buildup);
        // 0.0002637·50 / (0.2·1·3e-6·0.1225)
        assert!((cfg.td_per_hour(50.0) - 179_387.8).abs() < 1.0);
        // 0.8936·0.01 / (0.2·3e-6·50·0.1225)
        assert!((cfg.dimensionless_storage(0.01) - 2431.6).abs() < 0.5);
        // 141.2·500·1.2·1 / (50·50)
        assert!((cfg.pressure_scale(50.0) - 33.888).abs() < 1e-3);
    }
}
