//! Error types for teke.

use thiserror::Error;

/// The main error type for teke operations.
#[derive(Debug, Error)]
pub enum TekeError {
    /// Candle tensor operation failed
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Shape mismatch
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Entity or relation id outside its table
    #[error("invalid {kind} index {index} (table has {bound} rows)")]
    InvalidIndex {
        kind: &'static str,
        index: usize,
        bound: usize,
    },

    /// Checkpoint file is missing a parameter
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid hyper-parameters
    #[error("config error: {0}")]
    Config(String),
}

impl TekeError {
    pub(crate) fn shape(expected: impl std::fmt::Debug, got: impl std::fmt::Debug) -> Self {
        TekeError::ShapeMismatch {
            expected: format!("{:?}", expected),
            got: format!("{:?}", got),
        }
    }
}

/// Result type for teke operations.
pub type Result<T> = std::result::Result<T, TekeError>;
