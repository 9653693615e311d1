//! Engine error taxonomy
//!
//! Only precondition failures are errors. Regression shortfalls and optimizer
//! non-convergence are ordinary values (`SemiLogOutcome::InsufficientData`,
//! `MatchQuality { converged: false, .. }`) that callers branch on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Bad or insufficient sample data for the requested stage
    #[error("Data error: {0}")]
    Data(String),

    /// Invalid or incompatible test configuration / request
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
