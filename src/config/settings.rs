//! Engine Configuration - every tunable threshold as a TOML value
//!
//! Each struct implements `Default` with the documented defaults, so an
//! absent file or an absent key behaves exactly like the built-in engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an engine config file.
pub const CONFIG_ENV_VAR: &str = "PTA_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pta_config.toml";

// ============================================================================
// Config Provenance: tracks which keys the user explicitly set
// ============================================================================

/// Dotted key paths explicitly present in the user's TOML file.
///
/// After deserialization every `#[serde(default)]` field has a value, so this
/// is the only record of which values the operator actually chose.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    pub explicit_keys: HashSet<String>,
}

impl ConfigProvenance {
    /// Example: `provenance.is_user_set("regimes.slope_tolerance")`
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the analysis engine.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$PTA_CONFIG` env var
/// 2. `./pta_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Derivative smoothing and sample requirements
    #[serde(default)]
    pub diagnostics: DiagnosticSettings,

    /// Flow-regime classification thresholds
    #[serde(default)]
    pub regimes: RegimeSettings,

    /// Semi-log straight-line analysis
    #[serde(default)]
    pub semilog: SemiLogSettings,

    /// Auto-match optimizer
    #[serde(default)]
    pub matching: MatchSettings,

    /// Deliverability and forecast output
    #[serde(default)]
    pub deliverability: DeliverabilitySettings,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PTA_CONFIG` environment variable
    /// 2. `./pta_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        Self::load_with_provenance().0
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _provenance) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    /// Load from a specific TOML file path, also returning provenance.
    pub fn load_from_file_with_provenance(
        path: &Path,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (config, provenance) = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
                other => other,
            })?;
        Ok((config, provenance))
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<(Self, ConfigProvenance), ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let provenance = ConfigProvenance {
            explicit_keys: super::validation::walk_toml_keys(
                &contents
                    .parse::<toml::Value>()
                    .unwrap_or(toml::Value::Table(Default::default())),
                "",
            )
            .into_iter()
            .collect(),
        };

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok((config, provenance))
    }

    /// Load configuration using the standard search order, returning provenance.
    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok((config, provenance)) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return (config, provenance);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./pta_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok((config, provenance)) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return (config, provenance);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults; no file, so nothing is user-set
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        (Self::default(), ConfigProvenance::default())
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Validate all settings for internal consistency.
    ///
    /// Rules:
    /// - Tolerances and windows must be positive and finite
    /// - The slope window must span at least 0.2 log cycles
    /// - Semi-log regression needs at least 3 points
    /// - Match weights must be non-negative, skin bounds ordered
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let d = &self.diagnostics;
        Self::check_positive(d.smoothing, "diagnostics.smoothing", &mut errors);
        Self::check_positive(d.early_time_cutoff_hours, "diagnostics.early_time_cutoff_hours", &mut errors);
        if d.min_samples < 3 {
            errors.push(format!("diagnostics.min_samples ({}) must be >= 3", d.min_samples));
        }

        let r = &self.regimes;
        Self::check_positive(r.slope_tolerance, "regimes.slope_tolerance", &mut errors);
        if r.slope_tolerance >= 0.5 {
            errors.push(format!(
                "regimes.slope_tolerance ({:.2}) must be < 0.5 so unit slope and flat runs stay distinct",
                r.slope_tolerance
            ));
        }
        if !(r.window_log_cycles.is_finite() && r.window_log_cycles >= 0.2) {
            errors.push(format!(
                "regimes.window_log_cycles ({}) must span >= 0.2 log cycles",
                r.window_log_cycles
            ));
        }
        if r.min_run_points < 2 {
            errors.push(format!("regimes.min_run_points ({}) must be >= 2", r.min_run_points));
        }
        Self::check_positive(r.min_iarf_log_cycles, "regimes.min_iarf_log_cycles", &mut errors);

        if self.semilog.min_points < 3 {
            errors.push(format!("semilog.min_points ({}) must be >= 3", self.semilog.min_points));
        }
        let cl = self.semilog.confidence_level;
        if !(cl > 0.0 && cl < 1.0) {
            errors.push(format!("semilog.confidence_level ({cl}) must lie in (0, 1)"));
        }

        let m = &self.matching;
        if m.max_iterations == 0 {
            errors.push("matching.max_iterations must be > 0".to_string());
        }
        Self::check_positive(m.tolerance, "matching.tolerance", &mut errors);
        Self::check_positive(m.step_epsilon, "matching.step_epsilon", &mut errors);
        Self::check_positive(m.initial_damping, "matching.initial_damping", &mut errors);
        for (value, name) in [
            (m.derivative_weight, "matching.derivative_weight"),
            (m.iarf_weight, "matching.iarf_weight"),
            (m.early_weight, "matching.early_weight"),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("{name} must be >= 0 (got {value})"));
            }
        }
        if !(0.0..1.0).contains(&m.early_fraction) {
            errors.push(format!("matching.early_fraction ({}) must lie in [0, 1)", m.early_fraction));
        }
        if m.max_consecutive_increases == 0 {
            errors.push("matching.max_consecutive_increases must be > 0".to_string());
        }
        if !(m.skin_min.is_finite() && m.skin_max.is_finite()) || m.skin_min >= m.skin_max {
            errors.push(format!(
                "matching.skin_min ({}) must be < skin_max ({})",
                m.skin_min, m.skin_max
            ));
        }

        let dv = &self.deliverability;
        Self::check_positive(dv.drainage_radius, "deliverability.drainage_radius", &mut errors);
        if dv.ipr_points < 2 {
            errors.push(format!("deliverability.ipr_points ({}) must be >= 2", dv.ipr_points));
        }
        if dv.forecast_steps == 0 {
            errors.push("deliverability.forecast_steps must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass; catch them explicitly
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be finite and > 0 (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Diagnostics
// ============================================================================

/// Bourdet derivative smoothing and input requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticSettings {
    /// Smoothing window L: minimum ln-time distance to each derivative neighbor.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,

    /// Derivative is undefined for Δt below this (hours).
    #[serde(default = "default_early_time_cutoff")]
    pub early_time_cutoff_hours: f64,

    /// Minimum number of samples after normalization.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_smoothing() -> f64 { 0.2 }
fn default_early_time_cutoff() -> f64 { 0.001 }
fn default_min_samples() -> usize { 5 }

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            early_time_cutoff_hours: default_early_time_cutoff(),
            min_samples: default_min_samples(),
        }
    }
}

// ============================================================================
// Regime Classification
// ============================================================================

/// Flow-regime classification thresholds.
///
/// Defaults were calibrated against the homogeneous and bounded analytical
/// curves of the model library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegimeSettings {
    /// ε: allowed departure of the local slope from 1 (storage) or 0 (IARF).
    #[serde(default = "default_slope_tolerance")]
    pub slope_tolerance: f64,

    /// Width of the local slope window in log10 cycles.
    #[serde(default = "default_window_log_cycles")]
    pub window_log_cycles: f64,

    /// Minimum points in a storage / IARF / boundary run.
    #[serde(default = "default_min_run_points")]
    pub min_run_points: usize,

    /// Minimum IARF span in log10 cycles.
    #[serde(default = "default_min_iarf_log_cycles")]
    pub min_iarf_log_cycles: f64,

    /// Non-qualifying points tolerated inside a run.
    #[serde(default = "default_max_gap_points")]
    pub max_gap_points: usize,
}

fn default_slope_tolerance() -> f64 { 0.1 }
fn default_window_log_cycles() -> f64 { 0.25 }
fn default_min_run_points() -> usize { 5 }
fn default_min_iarf_log_cycles() -> f64 { 0.3 }
fn default_max_gap_points() -> usize { 1 }

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            slope_tolerance: default_slope_tolerance(),
            window_log_cycles: default_window_log_cycles(),
            min_run_points: default_min_run_points(),
            min_iarf_log_cycles: default_min_iarf_log_cycles(),
            max_gap_points: default_max_gap_points(),
        }
    }
}

// ============================================================================
// Semi-Log Analysis
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemiLogSettings {
    /// Minimum IARF points for the straight-line fit.
    #[serde(default = "default_semilog_min_points")]
    pub min_points: usize,

    /// Two-sided confidence level of the permeability interval.
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_semilog_min_points() -> usize { 3 }
fn default_confidence_level() -> f64 { 0.95 }

impl Default for SemiLogSettings {
    fn default() -> Self {
        Self {
            min_points: default_semilog_min_points(),
            confidence_level: default_confidence_level(),
        }
    }
}

// ============================================================================
// Auto-Match
// ============================================================================

/// Levenberg-Marquardt settings and objective weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Relative residual reduction below which an iteration counts as stalled.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Parameter step norm (internal space) treated as converged.
    #[serde(default = "default_step_epsilon")]
    pub step_epsilon: f64,

    /// Weight of the derivative term relative to the pressure term.
    #[serde(default = "default_derivative_weight")]
    pub derivative_weight: f64,

    /// Point weight inside the IARF segment.
    #[serde(default = "default_iarf_weight")]
    pub iarf_weight: f64,

    /// Point weight for the earliest `early_fraction` of the log-time span.
    #[serde(default = "default_early_weight")]
    pub early_weight: f64,

    #[serde(default = "default_early_fraction")]
    pub early_fraction: f64,

    /// Consecutive rejected (residual-increasing) steps before reporting divergence.
    #[serde(default = "default_max_consecutive_increases")]
    pub max_consecutive_increases: usize,

    /// Starting Marquardt damping factor.
    #[serde(default = "default_initial_damping")]
    pub initial_damping: f64,

    /// Lower skin bound for the fit. Productivity index needs
    /// s > 0.75 − ln(re/rw), about −6.9 at the default drainage radius,
    /// so fits below that cannot feed deliverability.
    #[serde(default = "default_skin_min")]
    pub skin_min: f64,

    #[serde(default = "default_skin_max")]
    pub skin_max: f64,
}

fn default_max_iterations() -> usize { 100 }
fn default_tolerance() -> f64 { 1e-6 }
fn default_step_epsilon() -> f64 { 1e-8 }
fn default_derivative_weight() -> f64 { 1.0 }
fn default_iarf_weight() -> f64 { 2.0 }
fn default_early_weight() -> f64 { 0.5 }
fn default_early_fraction() -> f64 { 0.1 }
fn default_max_consecutive_increases() -> usize { 8 }
fn default_initial_damping() -> f64 { 1e-3 }
fn default_skin_min() -> f64 { -10.0 }
fn default_skin_max() -> f64 { 50.0 }

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            step_epsilon: default_step_epsilon(),
            derivative_weight: default_derivative_weight(),
            iarf_weight: default_iarf_weight(),
            early_weight: default_early_weight(),
            early_fraction: default_early_fraction(),
            max_consecutive_increases: default_max_consecutive_increases(),
            initial_damping: default_initial_damping(),
            skin_min: default_skin_min(),
            skin_max: default_skin_max(),
        }
    }
}

// ============================================================================
// Deliverability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliverabilitySettings {
    /// Drainage radius re (ft) for infinite-acting models.
    #[serde(default = "default_drainage_radius")]
    pub drainage_radius: f64,

    /// Number of (rate, pressure) pairs on an IPR curve.
    #[serde(default = "default_ipr_points")]
    pub ipr_points: usize,

    /// Number of time steps in a forecast (excluding t = 0).
    #[serde(default = "default_forecast_steps")]
    pub forecast_steps: usize,
}

/// 40-acre spacing
fn default_drainage_radius() -> f64 { 745.0 }
fn default_ipr_points() -> usize { 21 }
fn default_forecast_steps() -> usize { 50 }

impl Default for DeliverabilitySettings {
    fn default() -> Self {
        Self {
            drainage_radius: default_drainage_radius(),
            ipr_points: default_ipr_points(),
            forecast_steps: default_forecast_steps(),
        }
    }
}
