//! Engine Configuration Module
//!
//! Operator-tunable settings for every stage of the engine, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PTA_CONFIG` environment variable (path to TOML file)
//! 2. `pta_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Library entry points take their settings explicitly. Hosts that want a
//! process-wide config call `config::init()` once at startup, then
//! `config::get()` anywhere:
//!
//! ```ignore
//! config::init(EngineConfig::load());
//! let smoothing = config::get().diagnostics.smoothing;
//! ```

mod settings;
pub mod validation;

pub use settings::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: EngineConfig) {
    for w in validation::plausibility_warnings(&config) {
        tracing::warn!("{}", w);
    }
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Falls back to built-in defaults when `init()` was never called.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(EngineConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}
