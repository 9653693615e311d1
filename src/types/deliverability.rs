//! Deliverability types: FlowCapacity, IprMethod

use serde::{Deserialize, Serialize};

/// Production indicators derived from matched parameters.
///
/// `damage_ratio` uses the reciprocal convention DR = 1 / FE, so a
/// stimulated well (s < 0) has DR < 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FlowCapacity {
    /// Permeability-thickness k·h (md·ft)
    pub kh: f64,
    /// Productivity index with the matched skin (STB/D/psi)
    pub productivity_index: f64,
    /// Productivity index at s = 0
    pub productivity_index_ideal: f64,
    /// PI / PI_ideal
    pub flow_efficiency: f64,
    /// 1 / flow efficiency
    pub damage_ratio: f64,
}

/// Inflow performance relation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IprMethod {
    /// Straight line q = J(p̄ − pwf), single-phase liquid above bubble point
    Darcy,
    /// Vogel two-phase / gas relation
    Vogel,
}

impl std::fmt::Display for IprMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IprMethod::Darcy => write!(f, "Darcy"),
            IprMethod::Vogel => write!(f, "Vogel"),
        }
    }
}
