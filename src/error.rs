//! Engine error types

use thiserror::Error;

/// Errors surfaced by the analytics engine.
///
/// Degenerate but recoverable situations (single-value metric, too few
/// clusters) are reported inside stage results instead; only unmet hard
/// preconditions become an `EngineError`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("required column '{0}' not found and no alias matched")]
    MissingColumn(String),

    #[error("transaction table is empty")]
    EmptyInput,

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("insufficient samples: need at least {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("model has not been fitted yet")]
    NotFitted,

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unknown feature '{0}' requested for model input")]
    UnknownFeature(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
