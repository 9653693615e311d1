//! Semi-log analysis results

use serde::{Deserialize, Serialize};

/// Two-sided confidence interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Confidence level, e.g. 0.95
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Straight-line (IARF) interpretation of the semi-log plot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemiLogEstimate {
    /// Permeability k (md)
    pub permeability: f64,
    pub skin: f64,
    /// Extrapolated pressure at infinite shut-in (Horner only)
    pub p_star: Option<f64>,
    /// Semi-log slope m, pressure per log10 cycle (positive)
    pub slope_per_cycle: f64,
    /// ΔP read from the fitted line at Δt = 1 h
    pub delta_p_1h: f64,
    pub regression_r2: f64,
    /// Interval on k from the slope's standard error
    pub permeability_interval: Option<ConfidenceInterval>,
    pub points_used: usize,
}

/// Result of a semi-log analysis attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SemiLogOutcome {
    Estimate(SemiLogEstimate),
    /// Too few usable IARF points to fit a line
    InsufficientData { points: usize },
}

impl SemiLogOutcome {
    pub fn estimate(&self) -> Option<&SemiLogEstimate> {
        match self {
            SemiLogOutcome::Estimate(e) => Some(e),
            SemiLogOutcome::InsufficientData { .. } => None,
        }
    }
}
