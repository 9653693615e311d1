//! Diagnostic curve types: DiagnosticPoint, SuperpositionKind, FlowRegimeSegment

use serde::{Deserialize, Serialize};

/// Superposition time function used for a diagnostic series
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SuperpositionKind {
    /// Horner time (tp + Δt)/Δt with producing time `tp` (hours)
    Horner { producing_time: f64 },
    /// Miller-Dyes-Hutchinson: plain elapsed time
    Mdh,
}

impl SuperpositionKind {
    /// Superposition time for elapsed time `dt`.
    pub fn time(self, dt: f64) -> f64 {
        match self {
            SuperpositionKind::Horner { producing_time } => (producing_time + dt) / dt,
            SuperpositionKind::Mdh => dt,
        }
    }

    /// Equivalent (Agarwal) time: the monotonic time axis the derivative is
    /// taken against. ln of it differs from −ln(Horner time) by a constant.
    pub fn equivalent_time(self, dt: f64) -> f64 {
        match self {
            SuperpositionKind::Horner { producing_time } => {
                dt * producing_time / (producing_time + dt)
            }
            SuperpositionKind::Mdh => dt,
        }
    }

    pub fn is_horner(self) -> bool {
        matches!(self, SuperpositionKind::Horner { .. })
    }
}

/// One point of the diagnostic (log-log / semi-log) curve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticPoint {
    /// Δt (hours)
    pub elapsed_time: f64,
    /// Horner or MDH time
    pub superposition_time: f64,
    /// Measured pressure, kept for audit and semi-log plotting
    pub pressure: f64,
    /// |p − p_ref|
    pub delta_pressure: f64,
    /// Bourdet derivative dΔP/d ln(equivalent time), positive while ΔP grows;
    /// `None` where it cannot be log-plotted or lies before the early-time cutoff
    pub derivative: Option<f64>,
}

impl DiagnosticPoint {
    /// True when both ΔP and the derivative can go on a log-log plot.
    pub fn is_log_plottable(&self) -> bool {
        self.elapsed_time > 0.0
            && self.delta_pressure > 0.0
            && self.derivative.is_some_and(|d| d > 0.0 && d.is_finite())
    }
}

/// Diagnostic output of one run of the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticSeries {
    pub points: Vec<DiagnosticPoint>,
    pub superposition: SuperpositionKind,
    /// Pressure at Δt = 0 that ΔP is measured from
    pub reference_pressure: f64,
    /// Smoothing window L (natural-log units) the derivative was built with
    pub smoothing: f64,
}

impl DiagnosticSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn elapsed_times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.elapsed_time).collect()
    }
}

/// Flow regime identified on the derivative curve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowRegime {
    WellboreStorage,
    Transition,
    Iarf,
    Boundary,
}

impl std::fmt::Display for FlowRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowRegime::WellboreStorage => write!(f, "Wellbore Storage"),
            FlowRegime::Transition => write!(f, "Transition"),
            FlowRegime::Iarf => write!(f, "IARF"),
            FlowRegime::Boundary => write!(f, "Boundary"),
        }
    }
}

/// Descriptive sub-tag of a boundary segment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// Derivative rising: sealing fault / closed system
    NoFlow,
    /// Derivative falling: gas cap, aquifer
    ConstantPressure,
}

/// A labelled interval of the elapsed-time axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowRegimeSegment {
    pub regime: FlowRegime,
    pub start_time: f64,
    pub end_time: f64,
    /// Mean local log-log slope of the derivative across the segment
    pub mean_slope: f64,
    pub point_count: usize,
    #[serde(default)]
    pub boundary: Option<BoundaryKind>,
}

impl FlowRegimeSegment {
    pub fn contains(&self, elapsed_time: f64) -> bool {
        elapsed_time >= self.start_time && elapsed_time <= self.end_time
    }

    pub fn span(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Span in log10 cycles
    pub fn log_cycles(&self) -> f64 {
        if self.start_time <= 0.0 {
            return 0.0;
        }
        (self.end_time / self.start_time).log10()
    }
}
