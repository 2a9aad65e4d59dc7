//! Configuration system for marlkit.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/marlkit/config.toml` and/or `.marlkit/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarlkitConfig {
    /// Hyperparameter sweep defaults.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Python interpreter used to run patched training scripts.
    #[serde(default)]
    pub python: PythonConfig,
    /// Action-course store defaults.
    #[serde(default)]
    pub course: CourseConfig,
}

/// Defaults for `marlkit sweep`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Name of the top-level factory that builds the training function.
    #[serde(default = "default_function_name")]
    pub function_name: String,
    /// Name of the inner training function returned by the factory.
    #[serde(default = "default_subfunction_name")]
    pub subfunction_name: String,
    /// Independent seeds per hyperparameter combination.
    #[serde(default = "default_seeds_per_exp")]
    pub seeds_per_exp: usize,
    /// Root seed the per-run seeds are split from.
    #[serde(default)]
    pub root_seed: u64,
    /// Delete the patched module right after it has been loaded.
    #[serde(default = "default_true")]
    pub remove_tmp_file: bool,
    /// Suffix inserted before the extension of the patched module.
    #[serde(default = "default_tmp_suffix")]
    pub tmp_suffix: String,
    /// Environment passed to the factory as `make(env_name)`, if any.
    #[serde(default)]
    pub env_name: Option<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            function_name: default_function_name(),
            subfunction_name: default_subfunction_name(),
            seeds_per_exp: default_seeds_per_exp(),
            root_seed: 0,
            remove_tmp_file: true,
            tmp_suffix: default_tmp_suffix(),
            env_name: None,
        }
    }
}

fn default_function_name() -> String {
    "make_train".to_string()
}

fn default_subfunction_name() -> String {
    "train".to_string()
}

fn default_seeds_per_exp() -> usize {
    2
}

fn default_tmp_suffix() -> String {
    "_tmp".to_string()
}

fn default_true() -> bool {
    true
}

/// Python runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Path to the Python executable (`python3` when unset).
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    /// Virtual environment whose interpreter takes precedence.
    #[serde(default)]
    pub venv_path: Option<PathBuf>,
    /// Upper bound for a whole sweep subprocess, in seconds.
    #[serde(default = "default_python_timeout")]
    pub timeout_secs: u64,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            python_path: None,
            venv_path: None,
            timeout_secs: default_python_timeout(),
        }
    }
}

fn default_python_timeout() -> u64 {
    6 * 3600
}

/// Action-course store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    /// JSON-lines file holding the courses.
    #[serde(default = "default_course_file")]
    pub file: PathBuf,
    /// Number of actions per agent in a generated course.
    #[serde(default = "default_course_length")]
    pub length: usize,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            file: default_course_file(),
            length: default_course_length(),
        }
    }
}

fn default_course_file() -> PathBuf {
    PathBuf::from("random_actions.txt")
}

fn default_course_length() -> usize {
    5
}

impl MarlkitConfig {
    /// Reject values no sweep or course operation can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep.seeds_per_exp == 0 {
            return Err(ConfigError::Invalid {
                message: "sweep.seeds_per_exp must be at least 1".into(),
            });
        }
        if self.sweep.function_name.trim().is_empty()
            || self.sweep.subfunction_name.trim().is_empty()
        {
            return Err(ConfigError::Invalid {
                message: "sweep.function_name and sweep.subfunction_name must not be empty".into(),
            });
        }
        if self.sweep.tmp_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                message: "sweep.tmp_suffix must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Location of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "marlkit", "marlkit")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Location of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".marlkit").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides as dotted keys (`sweep.seeds_per_exp`)
/// 2. Environment variables (prefixed with `MARLKIT_`)
/// 3. Workspace-local config (`.marlkit/config.toml`)
/// 4. User config (`~/.config/marlkit/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: &[(&str, serde_json::Value)],
) -> Result<MarlkitConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(MarlkitConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            tracing::debug!(path = %user_config.display(), "Merging user config");
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            tracing::debug!(path = %ws_config.display(), "Merging workspace config");
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // MARLKIT_SWEEP__SEEDS_PER_EXP, MARLKIT_PYTHON__TIMEOUT_SECS, ...
    figment = figment.merge(Env::prefixed("MARLKIT_").split("__"));

    for &(key, ref value) in overrides {
        figment = figment.merge(Serialized::default(key, value.clone()));
    }

    let config: MarlkitConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|path| path.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
