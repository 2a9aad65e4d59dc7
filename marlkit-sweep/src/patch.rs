//! Textual patching of training scripts.
//!
//! A training script exposes a factory (`make_train(config)`) that defines and
//! returns an inner function (`train(rng)`). Patching appends the swept
//! hyperparameters to the inner function's parameter list and redirects every
//! `config["NAME"]` / `config['NAME']` read inside it to the bare parameter.
//!
//! Matching is purely literal. A script that deviates from the expected
//! layout comes out unpatched or partially patched without an error; the
//! mismatch only shows up when the patched function is called.

use marlkit_core::config::SweepConfig;
use marlkit_core::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SweepError;

/// Marker line that closes the factory body.
const FACTORY_RETURN: &str = "return train";

/// Names and suffix used when patching a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOptions {
    pub function_name: String,
    pub subfunction_name: String,
    pub suffix: String,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for PatchOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            function_name: config.function_name.clone(),
            subfunction_name: config.subfunction_name.clone(),
            suffix: config.tmp_suffix.clone(),
        }
    }
}

/// What a patch pass actually touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchReport {
    /// Inner-function definition lines whose parameter list was extended.
    pub signature_lines: usize,
    /// `config[...]` reads replaced by a bare parameter name.
    pub replaced_reads: usize,
}

impl PatchReport {
    /// True when the pass found nothing to rewrite.
    pub fn is_noop(&self) -> bool {
        self.signature_lines == 0 && self.replaced_reads == 0
    }
}

/// Patched script text plus the report for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedSource {
    pub text: String,
    pub report: PatchReport,
}

/// Rewrite `source` so the inner training function takes `params` as extra
/// positional parameters.
///
/// Line terminators are preserved. An empty `params` leaves signatures alone.
pub fn patch_source(source: &str, options: &PatchOptions, params: &[&str]) -> PatchedSource {
    let factory_def = format!("def {}", options.function_name);
    let inner_def = format!("def {}", options.subfunction_name);
    let replacements: Vec<(String, String, &str)> = params
        .iter()
        .map(|name| {
            (
                format!("config[\"{name}\"]"),
                format!("config['{name}']"),
                *name,
            )
        })
        .collect();
    let extra_params = format!(", {}):", params.join(", "));

    let mut report = PatchReport::default();
    let mut text = String::with_capacity(source.len() + 64);
    let mut in_factory = false;
    let mut in_inner = false;

    for raw in source.split_inclusive('\n') {
        let stripped = raw.trim();
        let mut line = raw.to_string();

        if stripped.starts_with(&factory_def) {
            in_factory = true;
        } else if in_factory && stripped.starts_with(&inner_def) {
            in_inner = true;
            if !params.is_empty() && line.contains("):") {
                line = line.replace("):", &extra_params);
                report.signature_lines += 1;
            }
        } else if stripped == FACTORY_RETURN {
            // The inner flag deliberately stays set past this point.
            in_factory = false;
        }

        if in_inner {
            for (double, single, name) in &replacements {
                for pattern in [double, single] {
                    let hits = line.matches(pattern.as_str()).count();
                    if hits > 0 {
                        line = line.replace(pattern.as_str(), name);
                        report.replaced_reads += hits;
                    }
                }
            }
        }

        text.push_str(&line);
    }

    PatchedSource { text, report }
}

/// Sibling path with `suffix` inserted before the extension.
///
/// `baselines/iql.py` + `_tmp` -> `baselines/iql_tmp.py`.
pub fn patched_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.file_stem().unwrap_or_default());
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// A patched script written next to its source.
///
/// Dropping the handle leaves the file in place; call [`PatchedModule::remove`]
/// to delete it.
#[derive(Debug, Clone)]
pub struct PatchedModule {
    source_path: PathBuf,
    path: PathBuf,
    report: PatchReport,
}

impl PatchedModule {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self) -> PatchReport {
        self.report
    }

    /// Delete the patched file. Returns `false` when it was already gone.
    pub fn remove(&self) -> io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed patched module");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Read `path`, patch it for `params` and write the result to its sibling path.
pub fn write_patched(
    path: &Path,
    options: &PatchOptions,
    params: &[&str],
) -> Result<PatchedModule, SweepError> {
    let source = std::fs::read_to_string(path)?;
    let patched = patch_source(&source, options, params);

    if patched.report.is_noop() && !params.is_empty() {
        warn!(
            script = %path.display(),
            function = %options.function_name,
            subfunction = %options.subfunction_name,
            "No signature or config read was patched; the script layout may not match"
        );
    }

    let target = patched_path(path, &options.suffix);
    atomic_write(&target, patched.text.as_bytes())?;
    debug!(
        script = %path.display(),
        patched = %target.display(),
        signature_lines = patched.report.signature_lines,
        replaced_reads = patched.report.replaced_reads,
        "Wrote patched module"
    );

    Ok(PatchedModule {
        source_path: path.to_path_buf(),
        path: target,
        report: patched.report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCRIPT: &str = r#"import jax

def make_train(config):
    scale = config["LR"]

    def train(rng):
        x = config["LR"] * 2
        y = config['LR'] + config["NUM_ENVS"]
        return {"x": x, "y": y}

    return train


def evaluate(config):
    return config["LR"]
"#;

    fn options() -> PatchOptions {
        PatchOptions::default()
    }

    #[test]
    fn test_inner_signature_gets_params() {
        let patched = patch_source(SCRIPT, &options(), &["LR"]);
        assert!(patched.text.contains("    def train(rng, LR):\n"));
        assert_eq!(patched.report.signature_lines, 1);
    }

    #[test]
    fn test_config_reads_become_bare_names() {
        let patched = patch_source(SCRIPT, &options(), &["LR"]);
        assert!(patched.text.contains("        x = LR * 2\n"));
        assert!(patched.text.contains("        y = LR + config[\"NUM_ENVS\"]\n"));
        assert_eq!(patched.report.replaced_reads, 2);
    }

    #[test]
    fn test_factory_body_outside_inner_is_untouched() {
        let patched = patch_source(SCRIPT, &options(), &["LR"]);
        assert!(patched.text.contains("    scale = config[\"LR\"]\n"));
    }

    #[test]
    fn test_inner_flag_survives_factory_return() {
        // Lines after `return train` are still treated as inner-function lines.
        let patched = patch_source(SCRIPT, &options(), &["LR"]);
        assert!(patched.text.contains("    return LR\n"));
    }

    #[test]
    fn test_multiple_params_in_order() {
        let patched = patch_source(SCRIPT, &options(), &["LR", "NUM_ENVS"]);
        assert!(patched.text.contains("def train(rng, LR, NUM_ENVS):"));
        assert!(patched.text.contains("y = LR + NUM_ENVS"));
    }

    #[test]
    fn test_missing_markers_leave_source_unchanged() {
        let source = "def build(config):\n    def step(rng):\n        return config[\"LR\"]\n";
        let patched = patch_source(source, &options(), &["LR"]);
        assert_eq!(patched.text, source);
        assert!(patched.report.is_noop());
    }

    #[test]
    fn test_inner_def_outside_factory_is_ignored() {
        let source = "def train(rng):\n    return config[\"LR\"]\n";
        let patched = patch_source(source, &options(), &["LR"]);
        assert_eq!(patched.text, source);
    }

    #[test]
    fn test_spacing_variants_do_not_match() {
        let source = "def make_train(config):\n    def train(rng):\n        a = config[ \"LR\" ]\n";
        let patched = patch_source(source, &options(), &["LR"]);
        assert!(patched.text.contains("config[ \"LR\" ]"));
    }

    #[test]
    fn test_crlf_line_endings_preserved() {
        let source = "def make_train(config):\r\n    def train(rng):\r\n        a = config['LR']\r\n";
        let patched = patch_source(source, &options(), &["LR"]);
        assert_eq!(
            patched.text,
            "def make_train(config):\r\n    def train(rng, LR):\r\n        a = LR\r\n"
        );
    }

    #[test]
    fn test_patched_path() {
        assert_eq!(
            patched_path(Path::new("/app/baselines/iql.py"), "_tmp"),
            PathBuf::from("/app/baselines/iql_tmp.py")
        );
        assert_eq!(
            patched_path(Path::new("train"), "_tmp"),
            PathBuf::from("train_tmp")
        );
        assert_eq!(
            patched_path(Path::new("ippo.tar.py"), "_x"),
            PathBuf::from("ippo.tar_x.py")
        );
    }

    #[test]
    fn test_write_patched_and_remove() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("iql.py");
        std::fs::write(&script, SCRIPT).unwrap();

        let module = write_patched(&script, &options(), &["LR"]).unwrap();
        assert_eq!(module.path(), dir.path().join("iql_tmp.py"));
        assert_eq!(module.source_path(), script);
        let written = std::fs::read_to_string(module.path()).unwrap();
        assert!(written.contains("def train(rng, LR):"));
        // The original script is never modified.
        assert_eq!(std::fs::read_to_string(&script).unwrap(), SCRIPT);

        assert!(module.remove().unwrap());
        assert!(!module.path().exists());
        assert!(!module.remove().unwrap());
    }

    #[test]
    fn test_write_patched_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = write_patched(&dir.path().join("absent.py"), &options(), &["LR"]).unwrap_err();
        assert!(matches!(err, SweepError::Io(_)));
    }
}
