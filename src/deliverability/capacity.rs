//! Flow capacity and productivity index
//!
//! Pseudo-steady-state productivity of a well centred in a circular
//! drainage area:
//!
//! ```text
//! J = k·h / (α_p·B·μ·(ln(re/rw) − 0.75 + s))
//! ```

use tracing::debug;

use crate::config::DeliverabilitySettings;
use crate::error::{EngineError, EngineResult};
use crate::types::{keys, FlowCapacity, ModelParameters, ModelType, TestConfig};

/// Drainage radius for the productivity index: the fitted boundary for a
/// closed-circle model, the configured radius otherwise.
pub fn drainage_radius(params: &ModelParameters, settings: &DeliverabilitySettings) -> f64 {
    match params.model_type {
        ModelType::BoundedCircular => params
            .get(keys::BOUNDARY_RADIUS)
            .unwrap_or(settings.drainage_radius),
        ModelType::HomogeneousRadial | ModelType::DualPorosity => settings.drainage_radius,
    }
}

/// Lowest skin with a defined productivity index, 0.75 − ln(re/rw).
///
/// About −6.9 for the default 745 ft drainage radius and a 0.35 ft well,
/// so a match that runs down to `matching.skin_min` can land below it.
pub fn minimum_skin(params: &ModelParameters, test: &TestConfig, settings: &DeliverabilitySettings) -> f64 {
    0.75 - (drainage_radius(params, settings) / test.wellbore_radius).ln()
}

/// Productivity index at skin `skin`. Defined only above `minimum_skin`.
pub fn productivity_index(
    params: &ModelParameters,
    test: &TestConfig,
    skin: f64,
    settings: &DeliverabilitySettings,
) -> EngineResult<f64> {
    let re = drainage_radius(params, settings);
    let denominator = (re / test.wellbore_radius).ln() - 0.75 + skin;
    if !(denominator > 0.0) || !denominator.is_finite() {
        return Err(EngineError::configuration(format!(
            "productivity index undefined: ln(re/rw) − 0.75 + s = {denominator:.4} \
             (re = {re}, rw = {}, s = {skin})",
            test.wellbore_radius
        )));
    }
    let kh = params.permeability * test.thickness;
    Ok(kh / (test.constants().pressure * test.formation_volume_factor * test.viscosity * denominator))
}

/// Flow capacity indicators for matched parameters.
///
/// Damage ratio follows the reciprocal convention DR = 1/FE. Skins at or
/// below `minimum_skin` are a configuration error.
pub fn flow_capacity(
    params: &ModelParameters,
    test: &TestConfig,
    settings: &DeliverabilitySettings,
) -> EngineResult<FlowCapacity> {
    test.validate()?;
    params.validate(test.wellbore_radius)?;

    let actual = productivity_index(params, test, params.skin, settings)?;
    let ideal = productivity_index(params, test, 0.0, settings)?;
    let flow_efficiency = actual / ideal;

    let capacity = FlowCapacity {
        kh: params.permeability * test.thickness,
        productivity_index: actual,
        productivity_index_ideal: ideal,
        flow_efficiency,
        damage_ratio: 1.0 / flow_efficiency,
    };
    debug!(
        kh = capacity.kh,
        pi = capacity.productivity_index,
        fe = capacity.flow_efficiency,
        "Flow capacity computed"
    );
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSettings;
    use crate::types::{sample_config, TestType};

    fn settings() -> DeliverabilitySettings {
        DeliverabilitySettings::default()
    }

    #[test]
    fn test_zero_skin_has_unit_flow_efficiency() {
        let cfg = sample_config(TestType::Buildup);
        let capacity = flow_capacity(&ModelParameters::homogeneous(50.0, 0.0, 0.01), &cfg, &settings()).unwrap();
        assert_eq!(capacity.flow_efficiency, 1.0);
        assert_eq!(capacity.damage_ratio, 1.0);
        assert_eq!(capacity.kh, 2500.0);
        // 2500 / (141.2·1.2·(ln(745/0.35) − 0.75))
        assert!((capacity.productivity_index - 2.134).abs() < 0.005);
    }

    #[test]
    fn test_damage_lowers_efficiency() {
        let cfg = sample_config(TestType::Buildup);
        let damaged = flow_capacity(&ModelParameters::homogeneous(50.0, 5.0, 0.01), &cfg, &settings()).unwrap();
        assert!(damaged.flow_efficiency < 1.0);
        assert!(damaged.damage_ratio > 1.0);
        assert!((damaged.flow_efficiency * damaged.damage_ratio - 1.0).abs() < 1e-12);

        let stimulated = flow_capacity(&ModelParameters::homogeneous(50.0, -2.0, 0.01), &cfg, &settings()).unwrap();
        assert!(stimulated.flow_efficiency > 1.0);
    }

    #[test]
    fn test_non_positive_denominator_is_configuration_error() {
        let cfg = sample_config(TestType::Buildup);
        let err = flow_capacity(&ModelParameters::homogeneous(50.0, -7.5, 0.01), &cfg, &settings()).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_minimum_skin_bounds_productivity_index() {
        let cfg = sample_config(TestType::Buildup);
        let params = ModelParameters::homogeneous(50.0, 0.0, 0.01);
        let floor = minimum_skin(&params, &cfg, &settings());
        assert!((floor - (0.75 - (745.0f64 / 0.35).ln())).abs() < 1e-12);
        assert!(floor > MatchSettings::default().skin_min);

        assert!(productivity_index(&params, &cfg, floor + 0.01, &settings()).is_ok());
        assert!(productivity_index(&params, &cfg, floor - 1e-9, &settings()).is_err());
        assert!(productivity_index(&params, &cfg, MatchSettings::default().skin_min, &settings()).is_err());
    }

    #[test]
    fn test_bounded_model_uses_fitted_radius() {
        let params = ModelParameters::bounded_circular(50.0, 0.0, 0.01, 1500.0);
        assert_eq!(drainage_radius(&params, &settings()), 1500.0);
        let homogeneous = ModelParameters::homogeneous(50.0, 0.0, 0.01);
        assert_eq!(drainage_radius(&homogeneous, &settings()), 745.0);
    }
}
