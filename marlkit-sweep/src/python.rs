//! Backend that runs a patched Python training script.
//!
//! The driver loads the patched module by path, fetches the factory, calls it
//! with the config (and `make(env_name)` when an environment is configured)
//! and then calls the returned function once per trial as
//! `train(rng, *hyperparams)`. Outputs come back as JSON, arrays as lists.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::backend::TrainBackend;
use crate::error::SweepError;
use crate::runtime::PythonRuntime;
use crate::trial::{TrainConfig, Trial};

const DRIVER: &str = include_str!("driver.py");

pub struct PythonBackend {
    runtime: PythonRuntime,
    module_path: PathBuf,
    function_name: String,
    env_name: Option<String>,
    remove_module: bool,
}

impl PythonBackend {
    pub fn new(
        runtime: PythonRuntime,
        module_path: impl Into<PathBuf>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            module_path: module_path.into(),
            function_name: function_name.into(),
            env_name: None,
            remove_module: false,
        }
    }

    /// Pass `make(env_name)` to the factory as its second argument.
    pub fn with_env(mut self, env_name: Option<String>) -> Self {
        self.env_name = env_name;
        self
    }

    /// Delete the module file right after the driver has loaded it.
    pub fn remove_module_after_load(mut self, remove: bool) -> Self {
        self.remove_module = remove;
        self
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    fn request(&self, config: &TrainConfig, trials: &[Trial]) -> Value {
        json!({
            "module_path": self.module_path,
            "function_name": self.function_name,
            "remove_module": self.remove_module,
            "env_name": self.env_name,
            "config": config,
            "trials": trials,
        })
    }
}

#[async_trait]
impl TrainBackend for PythonBackend {
    fn name(&self) -> &str {
        "python"
    }

    async fn train_batch(
        &self,
        config: &TrainConfig,
        trials: &[Trial],
    ) -> Result<Vec<Value>, SweepError> {
        debug!(
            module = %self.module_path.display(),
            function = %self.function_name,
            trials = trials.len(),
            "Dispatching batch to Python"
        );
        match self
            .runtime
            .run_script(DRIVER, &self.request(config, trials), None)
            .await?
        {
            Value::Array(outputs) => Ok(outputs),
            other => Err(SweepError::python(format!(
                "driver returned {} instead of a list of outputs",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
