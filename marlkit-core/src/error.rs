//! Error types for configuration loading.
//!
//! Sweep and course errors live next to their crates; this module only
//! covers what `marlkit-core` itself can fail at.

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}
