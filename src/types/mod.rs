//! Value types shared across the engine
//!
//! Every type here is an immutable value. Derived types (diagnostic points,
//! regime segments, match quality, flow capacity) are recomputed from their
//! inputs on demand and never cached:
//! - Inputs: Sample, TestConfig
//! - Diagnostic Engine: DiagnosticPoint, DiagnosticSeries
//! - Regime Classifier: FlowRegimeSegment
//! - Semi-Log Analyzer: SemiLogOutcome, SemiLogEstimate
//! - Matching: ModelParameters, MatchQuality
//! - Deliverability: FlowCapacity

mod samples;
mod diagnostics;
mod semilog;
mod model;
mod deliverability;

pub use test::*;
pub use samples::*;
pub use diagnostics::*;
pub use semilog::*;
pub use model::*;
pub use deliverability::*;

#[cfg(test)]
pub(crate) use samples::sample_config;
