//! Unit-system constants for the dimensionless groups
//!
//! Every formula in the engine is written once in dimensionless form. The
//! unit system only decides the three conversion constants that map field or
//! metric quantities onto those groups:
//!
//! - `α_p`: pD = k·h·Δp / (α_p·q·B·μ)
//! - `α_t`: tD = α_t·k·t / (φ·μ·ct·rw²)   (t in hours)
//! - `α_C`: CD = α_C·C / (φ·ct·h·rw²)
//!
//! | Quantity | Field | Metric |
//! |----------|-------|--------|
//! | pressure | psi | kPa |
//! | rate | STB/D | m³/d |
//! | length | ft | m |
//! | permeability | md | md |
//! | viscosity | cp | mPa·s |
//! | storage | bbl/psi | m³/kPa |

use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_10, PI};

/// Unit system of a test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Field,
    Metric,
}

/// Conversion constants for one unit system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConstants {
    /// Pressure constant (141.2 field)
    pub pressure: f64,
    /// Time constant, hours (0.0002637 field)
    pub time: f64,
    /// Wellbore storage constant (0.8936 field)
    pub storage: f64,
}

/// Hours per day, used by the unit-slope storage estimate (C = qB·Δt / 24ΔP).
pub const HOURS_PER_DAY: f64 = 24.0;

/// (ln 4 − γ) / ln 10: the constant term of the semi-log skin equation once
/// α_t has been pulled out.
const SEMILOG_SKIN_OFFSET: f64 = 0.351_37;

impl UnitSystem {
    pub fn constants(self) -> UnitConstants {
        match self {
            UnitSystem::Field => UnitConstants {
                pressure: 141.2,
                time: 0.000_263_7,
                storage: 0.8936,
            },
            UnitSystem::Metric => UnitConstants {
                pressure: 1866.4,
                time: 3.5529e-6,
                storage: 1.0 / (2.0 * PI),
            },
        }
    }

    pub fn pressure_label(self) -> &'static str {
        match self {
            UnitSystem::Field => "psi",
            UnitSystem::Metric => "kPa",
        }
    }
}

impl UnitConstants {
    /// Semi-log slope constant per log10 cycle: m = α_semilog·qBμ/(kh).
    ///
    /// Field units give the familiar 162.6.
    pub fn semilog(&self) -> f64 {
        self.pressure * LN_10 / 2.0
    }

    /// Constant term of the semi-log skin equation (3.2275 in field units).
    pub fn skin_offset(&self) -> f64 {
        -self.time.log10() - SEMILOG_SKIN_OFFSET
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitSystem::Field => write!(f, "field"),
            UnitSystem::Metric => write!(f, "metric"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_semilog_constant() {
        let c = UnitSystem::Field.constants();
        assert!((c.semilog() - 162.6).abs() < 0.1, "got {}", c.semilog());
    }

    #[test]
    fn test_field_skin_offset() {
        let c = UnitSystem::Field.constants();
        assert!((c.skin_offset() - 3.2275).abs() < 1e-3, "got {}", c.skin_offset());
    }

    #[test]
    fn test_metric_semilog_constant() {
        let c = UnitSystem::Metric.constants();
        assert!((c.semilog() - 2148.8).abs() < 1.0, "got {}", c.semilog());
    }
}
