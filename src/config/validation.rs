//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// Maintained by hand to match the struct hierarchy in settings.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [diagnostics]
        "diagnostics",
        "diagnostics.smoothing",
        "diagnostics.early_time_cutoff_hours",
        "diagnostics.min_samples",
        // [regimes]
        "regimes",
        "regimes.slope_tolerance",
        "regimes.window_log_cycles",
        "regimes.min_run_points",
        "regimes.min_iarf_log_cycles",
        "regimes.max_gap_points",
        // [semilog]
        "semilog",
        "semilog.min_points",
        "semilog.confidence_level",
        // [matching]
        "matching",
        "matching.max_iterations",
        "matching.tolerance",
        "matching.step_epsilon",
        "matching.derivative_weight",
        "matching.iarf_weight",
        "matching.early_weight",
        "matching.early_fraction",
        "matching.max_consecutive_increases",
        "matching.initial_damping",
        "matching.skin_min",
        "matching.skin_max",
        // [deliverability]
        "deliverability",
        "deliverability.drainage_radius",
        "deliverability.ipr_points",
        "deliverability.forecast_steps",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so the suggestion is
/// stable across runs.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Flag legal but suspicious settings.
///
/// These never block loading; `EngineConfig::validate` owns hard errors.
pub fn plausibility_warnings(config: &super::EngineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Smoothing beyond ~0.5 log cycles flattens real regime transitions
    if config.diagnostics.smoothing > 1.2 {
        warnings.push(ValidationWarning {
            field: "diagnostics.smoothing".to_string(),
            message: format!(
                "diagnostics.smoothing = {:.2} is unusually wide (typical 0.1-0.5)",
                config.diagnostics.smoothing
            ),
            suggestion: None,
        });
    }

    if config.regimes.window_log_cycles > 1.0 {
        warnings.push(ValidationWarning {
            field: "regimes.window_log_cycles".to_string(),
            message: format!(
                "regimes.window_log_cycles = {:.2} spans more than a full log cycle",
                config.regimes.window_log_cycles
            ),
            suggestion: None,
        });
    }

    if config.matching.max_iterations > 10_000 {
        warnings.push(ValidationWarning {
            field: "matching.max_iterations".to_string(),
            message: format!(
                "matching.max_iterations = {} may keep the match task busy for a long time",
                config.matching.max_iterations
            ),
            suggestion: None,
        });
    }

    if config.matching.skin_min < -10.0 {
        warnings.push(ValidationWarning {
            field: "matching.skin_min".to_string(),
            message: format!(
                "matching.skin_min = {:.1} allows nonphysical stimulation below -10",
                config.matching.skin_min
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("smothing", "smoothing"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [matching]
            tolerance = 1e-6
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"matching".to_string()));
        assert!(keys.contains(&"matching.tolerance".to_string()));
    }

    #[test]
    fn test_every_default_key_is_known() {
        let text = toml::to_string(&super::super::EngineConfig::default()).unwrap();
        let value: toml::Value = text.parse().unwrap();
        let known = known_config_keys();
        for key in walk_toml_keys(&value, "") {
            assert!(known.contains(key.as_str()), "missing known key {key}");
        }
    }

    #[test]
    fn test_plausibility_flags_wide_smoothing() {
        let mut config = super::super::EngineConfig::default();
        config.diagnostics.smoothing = 2.0;
        let warnings = plausibility_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "diagnostics.smoothing");
    }
}
