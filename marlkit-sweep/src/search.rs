//! End-to-end sweep over an external training script.
//!
//! Patch the script, run the patched module through the Python backend for
//! every seed and hyperparameter combination, clean up the temp module.

use marlkit_core::MarlkitConfig;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::SweepError;
use crate::patch::{PatchOptions, write_patched};
use crate::python::PythonBackend;
use crate::runtime::PythonRuntime;
use crate::space::HyperParamSpace;
use crate::sweep::{HyperparamSweep, SweepOptions, SweepOutput};
use crate::trial::TrainConfig;

/// Everything a script sweep needs.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Training script containing the factory to patch.
    pub script: PathBuf,
    pub config: TrainConfig,
    pub space: HyperParamSpace,
    pub options: SweepOptions,
    pub patch: PatchOptions,
    /// Delete the patched module once it has been loaded.
    pub remove_tmp_file: bool,
    /// Environment handed to the factory as `make(env_name)`.
    pub env_name: Option<String>,
}

impl SearchRequest {
    /// Request with sweep defaults taken from the loaded configuration.
    pub fn from_config(
        settings: &MarlkitConfig,
        script: impl Into<PathBuf>,
        config: TrainConfig,
        space: HyperParamSpace,
    ) -> Self {
        Self {
            script: script.into(),
            config,
            space,
            options: SweepOptions::from(&settings.sweep),
            patch: PatchOptions::from(&settings.sweep),
            remove_tmp_file: settings.sweep.remove_tmp_file,
            env_name: settings.sweep.env_name.clone(),
        }
    }
}

/// Patch `request.script`, then train every seed x combination through Python.
///
/// The patched module is removed as soon as the driver has loaded it (and
/// again here if the driver never got that far) unless `remove_tmp_file` is
/// off, in which case it stays next to the script for inspection.
pub async fn hyperparam_search(
    request: &SearchRequest,
    runtime: PythonRuntime,
) -> Result<SweepOutput, SweepError> {
    let names = request.space.names();
    let module = write_patched(&request.script, &request.patch, &names)?;
    info!(
        script = %request.script.display(),
        module = %module.path().display(),
        params = ?names,
        "Patched training script"
    );

    let backend = PythonBackend::new(runtime, module.path(), &request.patch.function_name)
        .with_env(request.env_name.clone())
        .remove_module_after_load(request.remove_tmp_file);
    let sweep = HyperparamSweep::new(
        request.config.clone(),
        request.space.clone(),
        request.options,
    );
    let result = sweep.run(&backend).await;

    if request.remove_tmp_file {
        match module.remove() {
            Ok(true) => warn!(
                module = %module.path().display(),
                "Patched module was not removed by the loader; removed it now"
            ),
            Ok(false) => {}
            Err(e) => {
                if result.is_ok() {
                    return Err(e.into());
                }
                warn!(module = %module.path().display(), error = %e, "Failed to remove patched module");
            }
        }
    } else {
        info!(module = %module.path().display(), "Keeping patched module");
    }

    result
}
