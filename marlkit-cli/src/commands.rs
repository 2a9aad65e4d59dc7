//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::CourseAction;
use crate::SweepAction;
use anyhow::Context;
use marlkit_core::{MarlkitConfig, config_exists};
use marlkit_core::config::{load_config, workspace_config_path};
use marlkit_core::persistence::atomic_write_json;
use marlkit_course::CourseStore;
use marlkit_sweep::{
    HyperParamSpace, PatchOptions, PythonRuntime, SearchRequest, TrainConfig, hyperparam_search,
    write_patched,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Sweep { action } => handle_sweep(action, workspace).await,
        Commands::Course { action } => handle_course(action, workspace),
    }
}

fn load(
    workspace: &Path,
    overrides: &[(&str, serde_json::Value)],
) -> anyhow::Result<MarlkitConfig> {
    load_config(Some(workspace), overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&MarlkitConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            if !config_exists(Some(workspace)) {
                eprintln!(
                    "  No configuration file found; showing defaults. \
                     Run `marlkit config init` to create one."
                );
            }
            let config = load(workspace, &[])?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn handle_sweep(action: SweepAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        SweepAction::Patch {
            script,
            params,
            function,
            subfunction,
        } => {
            let mut overrides = Vec::new();
            if let Some(function) = function {
                overrides.push(("sweep.function_name", json!(function)));
            }
            if let Some(subfunction) = subfunction {
                overrides.push(("sweep.subfunction_name", json!(subfunction)));
            }
            let config = load(workspace, &overrides)?;

            let names: Vec<&str> = params.iter().map(String::as_str).collect();
            let script = resolve(workspace, script);
            let module = write_patched(&script, &PatchOptions::from(&config.sweep), &names)?;
            let report = module.report();
            println!("{}", module.path().display());
            println!(
                "  {} signature line(s), {} config read(s) replaced",
                report.signature_lines, report.replaced_reads
            );
            Ok(())
        }
        SweepAction::Run {
            script,
            space,
            config,
            seeds,
            seed,
            env,
            keep_tmp,
            output,
            mean,
        } => {
            let mut overrides = Vec::new();
            if let Some(seeds) = seeds {
                overrides.push(("sweep.seeds_per_exp", json!(seeds)));
            }
            if let Some(seed) = seed {
                overrides.push(("sweep.root_seed", json!(seed)));
            }
            if let Some(env) = env {
                overrides.push(("sweep.env_name", json!(env)));
            }
            if keep_tmp {
                overrides.push(("sweep.remove_tmp_file", json!(false)));
            }
            let settings = load(workspace, &overrides)?;

            let space = read_space(&resolve(workspace, space))?;
            let train_config = match config {
                Some(path) => read_train_config(&resolve(workspace, path))?,
                None => TrainConfig::new(),
            };
            let request = SearchRequest::from_config(
                &settings,
                resolve(workspace, script),
                train_config,
                space,
            );
            let runtime = PythonRuntime::from_config(&settings.python, workspace.to_path_buf());

            let result = hyperparam_search(&request, runtime).await?;
            info!(runs = result.cells.len(), "Sweep finished");

            println!("Sweep output shape {:?} over {:?}", result.shape, result.axes);
            if let Some(path) = mean {
                for (label, value) in result.seed_mean(&path)? {
                    println!("  {label}: {value}");
                }
            } else {
                for run in result.runs() {
                    println!("  {} ({} seeds)", run.label, run.outputs.len());
                }
            }
            if let Some(output) = output {
                let output = resolve(workspace, output);
                atomic_write_json(&output, &result)?;
                println!("Wrote sweep output to {}", output.display());
            }
            Ok(())
        }
    }
}

fn handle_course(action: CourseAction, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace, &[])?;
    let store_for = |file: Option<PathBuf>| {
        CourseStore::new(resolve(workspace, file.unwrap_or_else(|| config.course.file.clone())))
    };

    match action {
        CourseAction::Generate {
            file,
            length,
            count,
            seed,
        } => {
            let store = store_for(file);
            let length = length.unwrap_or(config.course.length);
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            for _ in 0..count {
                let record = store.generate(&mut rng, length)?;
                println!("{:?} {:?}", record.actions_1, record.actions_2);
            }
            println!(
                "Appended {count} course(s) to {} ({} total)",
                store.path().display(),
                store.len()
            );
            Ok(())
        }
        CourseAction::List { file } => {
            let store = store_for(file);
            match store.read_all() {
                Some(records) => {
                    for (index, record) in records.iter().enumerate() {
                        println!(
                            "{index:>4}  {} steps  {:?} | {:?}",
                            record.len(),
                            record.actions_1,
                            record.actions_2
                        );
                    }
                }
                None => println!("No courses in {}", store.path().display()),
            }
            Ok(())
        }
        CourseAction::Show { index, file } => {
            let store = store_for(file);
            match store.read_nth(index) {
                Some(record) => println!("{}", serde_json::to_string(&record)?),
                None => println!("No course {index} in {}", store.path().display()),
            }
            Ok(())
        }
    }
}

/// Relative paths are taken from the workspace.
fn resolve(workspace: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    }
}

/// Hyperparameter space from TOML (`.toml`) or JSON (anything else).
fn read_space(path: &Path) -> anyhow::Result<HyperParamSpace> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading hyperparameter space {}", path.display()))?;
    let space = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(space)
}

fn read_train_config(path: &Path) -> anyhow::Result<TrainConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading training config {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
