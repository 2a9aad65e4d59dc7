//! Python runtime for patched training scripts.
//!
//! Provides managed subprocess execution: interpreter resolution (venv aware),
//! JSON over stdin/stdout, and a hard timeout.

use marlkit_core::config::PythonConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::SweepError;

/// Information about the detected Python installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonInfo {
    pub path: PathBuf,
    pub version: String,
    pub venv_path: Option<PathBuf>,
}

/// Managed Python subprocess runner.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    python_path: PathBuf,
    venv_path: Option<PathBuf>,
    workspace: PathBuf,
    timeout: Duration,
}

impl PythonRuntime {
    /// Runtime using `python3` from `PATH`.
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            python_path: PathBuf::from("python3"),
            venv_path: None,
            workspace,
            timeout: Duration::from_secs(300),
        }
    }

    /// Create with explicit paths.
    pub fn with_config(
        python_path: PathBuf,
        venv_path: Option<PathBuf>,
        workspace: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            python_path,
            venv_path,
            workspace,
            timeout,
        }
    }

    /// Build from the `[python]` config section.
    pub fn from_config(config: &PythonConfig, workspace: PathBuf) -> Self {
        Self::with_config(
            config
                .python_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("python3")),
            config.venv_path.clone(),
            workspace,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Detect an available Python installation.
    pub async fn detect() -> Result<PythonInfo, SweepError> {
        for cmd in &["python3", "python"] {
            let output = Command::new(cmd).args(["--version"]).output().await;

            if let Ok(output) = output {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    let version = if version.is_empty() {
                        String::from_utf8_lossy(&output.stderr).trim().to_string()
                    } else {
                        version
                    };

                    return Ok(PythonInfo {
                        path: PathBuf::from(cmd),
                        version,
                        venv_path: std::env::var_os("VIRTUAL_ENV")
                            .map(PathBuf::from)
                            .filter(|p| p.exists()),
                    });
                }
            }
        }

        Err(SweepError::python(
            "Python not found. Install Python 3.8+ to run training scripts.",
        ))
    }

    /// Get the effective Python command (accounting for venv).
    fn python_cmd(&self) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
            venv.join(bin_dir).join("python")
        } else {
            self.python_path.clone()
        }
    }

    /// Run a Python script with JSON input/output.
    ///
    /// The script receives `input` as JSON on stdin and must write its result
    /// as JSON to stdout. Anything on stderr is passed through to the error
    /// on failure.
    pub async fn run_script(
        &self,
        script: &str,
        input: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, SweepError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let input_json = serde_json::to_vec(input)?;

        debug!(
            python = %self.python_cmd().display(),
            script_len = script.len(),
            input_len = input_json.len(),
            "Running Python script"
        );

        let result = tokio::time::timeout(timeout, async {
            let mut child = Command::new(self.python_cmd())
                .args(["-c", script])
                .current_dir(&self.workspace)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| SweepError::python(format!("Failed to spawn Python: {e}")))?;

            if let Some(mut stdin) = child.stdin.take() {
                // A script that exits without reading stdin reports through its exit status.
                let written = match stdin.write_all(&input_json).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e.into());
                    }
                }
            }

            let output = child.wait_with_output().await?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SweepError::python(format!(
                    "Python script failed ({}): {}",
                    output.status,
                    stderr.trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim().is_empty() {
                Ok(serde_json::Value::Null)
            } else {
                serde_json::from_str(stdout.trim())
                    .map_err(|e| SweepError::python(format!("Invalid JSON output: {e}")))
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(SweepError::Timeout(format!(
                "Python script timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}
