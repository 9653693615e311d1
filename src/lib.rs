//! Well-Test Engine: Pressure-Transient Diagnostics and Model Matching
//!
//! Turns gauge records from drawdown, buildup, injection and falloff tests
//! into diagnostic curves, flow-regime labels, straight-line estimates and
//! fitted analytical reservoir models.
//!
//! ## Architecture
//!
//! ```text
//! Samples ─► diagnostics ─► regimes ─┐
//!                       └─► semilog ─┴─► matching ─► deliverability
//!                                          ▲
//!                                        models
//! ```
//!
//! - **diagnostics**: normalization, ΔP, superposition time, Bourdet derivative
//! - **regimes**: wellbore storage / IARF / boundary classification
//! - **semilog**: MDH / Horner straight line, k, s, p*, seed parameters
//! - **models**: Laplace-space analytical models with Stehfest inversion
//! - **matching**: Levenberg-Marquardt auto-match, cancellable background task
//! - **deliverability**: flow capacity, IPR, rate-schedule forecasts
//!
//! Every stage is a pure function of its inputs; only `matching::MatchTask`
//! touches the async runtime.

pub mod config;
pub mod deliverability;
pub mod diagnostics;
pub mod error;
pub mod matching;
pub mod models;
pub mod regimes;
pub mod semilog;
pub mod synthetic;
pub mod types;
pub mod units;

// Re-export engine configuration
pub use config::EngineConfig;

// Re-export errors
pub use error::{EngineError, EngineResult};

// Re-export commonly used types
pub use types::{
    BoundaryKind, DiagnosticPoint, DiagnosticSeries, FlowCapacity, FlowRegime, FlowRegimeSegment,
    FluidType, IprMethod, MatchOutcome, MatchQuality, ModelParameters, ModelType, Sample,
    SemiLogEstimate, SemiLogOutcome, SuperpositionKind, Termination, TestConfig, TestType,
};

// Re-export stage entry points
pub use deliverability::{flow_capacity, Forecast, IprCurve, RateSchedule};
pub use matching::{auto_match, MatchEvent, MatchHandle, MatchRequest, MatchTask};
pub use models::ReservoirModel;
pub use regimes::RegimeClassifier;
pub use synthetic::SyntheticTest;
pub use units::UnitSystem;
