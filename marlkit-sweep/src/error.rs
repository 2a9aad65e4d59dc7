//! Error types for the marlkit-sweep crate.

use thiserror::Error;

/// Top-level error type for sweep operations.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Invalid hyperparameter space: {0}")]
    InvalidSpace(String),

    #[error("Backend returned {got} outputs for a batch of {expected} trials")]
    BatchSize { expected: usize, got: usize },

    #[error("Output shape error: {0}")]
    OutputShape(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Python runtime error: {0}")]
    Python(String),

    #[error("Configuration error: {0}")]
    Config(#[from] marlkit_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl SweepError {
    pub fn invalid_space(msg: impl Into<String>) -> Self {
        Self::InvalidSpace(msg.into())
    }

    pub fn output_shape(msg: impl Into<String>) -> Self {
        Self::OutputShape(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn python(msg: impl Into<String>) -> Self {
        Self::Python(msg.into())
    }
}
