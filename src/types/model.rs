//! Model types: ModelType, ModelParameters, MatchQuality

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};

/// Keys used in `ModelParameters::model_specific`
pub mod keys {
    /// Dual porosity storativity ratio ω
    pub const OMEGA: &str = "omega";
    /// Dual porosity interporosity flow coefficient λ
    pub const LAMBDA: &str = "lambda";
    /// Closed circular boundary radius re (ft)
    pub const BOUNDARY_RADIUS: &str = "boundary_radius";
}

/// Analytical reservoir model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Infinite homogeneous reservoir with wellbore storage and skin
    #[default]
    HomogeneousRadial,
    /// Warren-Root pseudo-steady-state double porosity
    DualPorosity,
    /// Homogeneous reservoir inside a closed circular boundary
    BoundedCircular,
}

impl ModelType {
    /// Model-specific keys this model requires.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            ModelType::HomogeneousRadial => &[],
            ModelType::DualPorosity => &[keys::OMEGA, keys::LAMBDA],
            ModelType::BoundedCircular => &[keys::BOUNDARY_RADIUS],
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::HomogeneousRadial => write!(f, "Homogeneous Radial"),
            ModelType::DualPorosity => write!(f, "Dual Porosity"),
            ModelType::BoundedCircular => write!(f, "Bounded Circular"),
        }
    }
}

/// Reservoir model parameters, either user-entered or produced by a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParameters {
    pub model_type: ModelType,
    /// Permeability k (md)
    pub permeability: f64,
    /// Skin factor s (dimensionless)
    pub skin: f64,
    /// Wellbore storage coefficient C (bbl/psi)
    pub storage: f64,
    #[serde(default)]
    pub model_specific: BTreeMap<String, f64>,
}

impl ModelParameters {
    pub fn homogeneous(permeability: f64, skin: f64, storage: f64) -> Self {
        Self {
            model_type: ModelType::HomogeneousRadial,
            permeability,
            skin,
            storage,
            model_specific: BTreeMap::new(),
        }
    }

    pub fn dual_porosity(permeability: f64, skin: f64, storage: f64, omega: f64, lambda: f64) -> Self {
        let mut params = Self::homogeneous(permeability, skin, storage);
        params.model_type = ModelType::DualPorosity;
        params.model_specific.insert(keys::OMEGA.to_string(), omega);
        params.model_specific.insert(keys::LAMBDA.to_string(), lambda);
        params
    }

    pub fn bounded_circular(permeability: f64, skin: f64, storage: f64, boundary_radius: f64) -> Self {
        let mut params = Self::homogeneous(permeability, skin, storage);
        params.model_type = ModelType::BoundedCircular;
        params
            .model_specific
            .insert(keys::BOUNDARY_RADIUS.to_string(), boundary_radius);
        params
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.model_specific.get(key).copied()
    }

    /// Same parameters with a different skin (used for the stimulated scenario).
    pub fn with_skin(&self, skin: f64) -> Self {
        let mut params = self.clone();
        params.skin = skin;
        params
    }

    /// Check the bounds of model theory: k > 0, C ≥ 0, finite skin,
    /// ω and λ in (0, 1), boundary radius beyond the wellbore.
    pub fn validate(&self, wellbore_radius: f64) -> EngineResult<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.permeability.is_finite() || self.permeability <= 0.0 {
            errors.push(format!("permeability must be > 0 (got {})", self.permeability));
        }
        if !self.storage.is_finite() || self.storage < 0.0 {
            errors.push(format!("storage must be >= 0 (got {})", self.storage));
        }
        if !self.skin.is_finite() {
            errors.push(format!("skin must be finite (got {})", self.skin));
        }

        for key in self.model_type.required_keys() {
            if self.get(key).is_none() {
                errors.push(format!("{} requires model-specific parameter '{key}'", self.model_type));
            }
        }

        if self.model_type == ModelType::DualPorosity {
            for key in [keys::OMEGA, keys::LAMBDA] {
                if let Some(v) = self.get(key) {
                    if !(v > 0.0 && v < 1.0) {
                        errors.push(format!("{key} must lie in (0, 1) (got {v})"));
                    }
                }
            }
        }

        if self.model_type == ModelType::BoundedCircular {
            if let Some(re) = self.get(keys::BOUNDARY_RADIUS) {
                if !re.is_finite() || re <= 10.0 * wellbore_radius {
                    errors.push(format!(
                        "boundary_radius ({re}) must exceed 10 wellbore radii ({})",
                        10.0 * wellbore_radius
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::configuration(errors.join("; ")))
        }
    }
}

/// Why the optimizer stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Relative residual reduction stayed below tolerance
    Converged,
    /// Parameter step became negligible
    StepTolerance,
    /// Iteration budget exhausted
    MaxIterations,
    /// Residual kept increasing or became non-finite
    Diverged,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        matches!(self, Termination::Converged | Termination::StepTolerance)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::StepTolerance => write!(f, "step tolerance reached"),
            Termination::MaxIterations => write!(f, "iteration budget exhausted"),
            Termination::Diverged => write!(f, "diverged"),
        }
    }
}

/// Fit quality reported by the optimizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatchQuality {
    /// Euclidean norm of the weighted residual vector
    pub residual_norm: f64,
    /// Coefficient of determination against the ΔP curve
    pub r_squared: f64,
    pub converged: bool,
    pub iterations: usize,
    pub termination: Termination,
}

/// Fitted parameters with their quality
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOutcome {
    pub parameters: ModelParameters,
    pub quality: MatchQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_porosity_bounds() {
        let ok = ModelParameters::dual_porosity(10.0, 0.0, 0.01, 0.1, 1e-6);
        assert!(ok.validate(0.35).is_ok());
        let bad = ModelParameters::dual_porosity(10.0, 0.0, 0.01, 1.5, 1e-6);
        assert!(bad.validate(0.35).is_err());
    }

    #[test]
    fn test_missing_model_specific_key_rejected() {
        let mut params = ModelParameters::homogeneous(10.0, 0.0, 0.01);
        params.model_type = ModelType::BoundedCircular;
        let err = params.validate(0.35).unwrap_err();
        assert!(err.to_string().contains("boundary_radius"));
    }

    #[test]
    fn test_zero_storage_allowed_negative_rejected() {
        assert!(ModelParameters::homogeneous(10.0, 0.0, 0.0).validate(0.35).is_ok());
        assert!(ModelParameters::homogeneous(10.0, 0.0, -1e-3).validate(0.35).is_err());
        assert!(ModelParameters::homogeneous(0.0, 0.0, 0.01).validate(0.35).is_err());
    }
}
