//! # marlkit Core
//!
//! Shared plumbing for the marlkit crates: the layered configuration,
//! the error taxonomy for it, and atomic file persistence helpers.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{
    CourseConfig, MarlkitConfig, PythonConfig, SweepConfig, config_exists, load_config,
};
pub use error::{ConfigError, Result};
