//! Batched sweeps over seeds and a hyperparameter grid.
//!
//! A sweep expands `seeds x p1 x p2 x ...` into an explicit batch of
//! [`Trial`]s (seed axis outermost, then each hyperparameter in space order,
//! row-major), hands the whole batch to a [`TrainBackend`] in one call and
//! keeps the outputs in a [`SweepOutput`] whose leading dimensions are
//! `[seeds, |p1|, |p2|, ...]`.

use indexmap::IndexMap;
use marlkit_core::ConfigError;
use marlkit_core::config::SweepConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::backend::TrainBackend;
use crate::error::SweepError;
use crate::seed::split_seed;
use crate::space::{Combination, HyperParamSpace};
use crate::trial::{TrainConfig, Trial};

/// Name of the leading output axis.
pub const SEED_AXIS: &str = "seed";

/// Seed settings for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOptions {
    pub seeds_per_exp: usize,
    pub root_seed: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            seeds_per_exp: config.seeds_per_exp,
            root_seed: config.root_seed,
        }
    }
}

/// A hyperparameter sweep ready to run.
#[derive(Debug, Clone)]
pub struct HyperparamSweep {
    config: TrainConfig,
    space: HyperParamSpace,
    options: SweepOptions,
}

impl HyperparamSweep {
    pub fn new(config: TrainConfig, space: HyperParamSpace, options: SweepOptions) -> Self {
        Self {
            config,
            space,
            options,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn space(&self) -> &HyperParamSpace {
        &self.space
    }

    pub fn options(&self) -> SweepOptions {
        self.options
    }

    /// `[seeds, |p1|, |p2|, ...]`.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![self.options.seeds_per_exp];
        shape.extend(self.space.shape());
        shape
    }

    /// The full batch, seed axis outermost.
    pub fn trials(&self) -> Vec<Trial> {
        let seeds = split_seed(self.options.root_seed, self.options.seeds_per_exp);
        let names = self.space.names();
        let combinations: Vec<Combination> = self.space.combinations().collect();

        let mut trials = Vec::with_capacity(seeds.len() * combinations.len());
        for (seed_index, &seed) in seeds.iter().enumerate() {
            for combination in &combinations {
                let params: IndexMap<String, _> = names
                    .iter()
                    .map(|name| name.to_string())
                    .zip(combination.values.iter().copied())
                    .collect();
                trials.push(Trial {
                    index: trials.len(),
                    seed_index,
                    seed,
                    indices: combination.indices.clone(),
                    params,
                });
            }
        }
        trials
    }

    /// Run every trial through `backend` in a single batched call.
    pub async fn run(&self, backend: &dyn TrainBackend) -> Result<SweepOutput, SweepError> {
        if self.options.seeds_per_exp == 0 {
            return Err(ConfigError::Invalid {
                message: "seeds_per_exp must be at least 1".into(),
            }
            .into());
        }

        let trials = self.trials();
        let shape = self.shape();
        info!(
            backend = backend.name(),
            trials = trials.len(),
            shape = ?shape,
            root_seed = self.options.root_seed,
            "Starting hyperparameter sweep"
        );
        let started = Instant::now();

        let cells = backend.train_batch(&self.config, &trials).await?;
        if cells.len() != trials.len() {
            return Err(SweepError::BatchSize {
                expected: trials.len(),
                got: cells.len(),
            });
        }

        info!(
            backend = backend.name(),
            trials = trials.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Hyperparameter sweep finished"
        );

        let mut axes = vec![SEED_AXIS.to_string()];
        axes.extend(self.space.names().into_iter().map(String::from));
        Ok(SweepOutput {
            axes,
            shape,
            seeds: trials
                .iter()
                .step_by(self.space.num_combinations().max(1))
                .map(|t| t.seed)
                .collect(),
            space: self.space.clone(),
            cells,
        })
    }
}

/// Outputs of a sweep laid out over `[seed, p1, p2, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutput {
    pub axes: Vec<String>,
    pub shape: Vec<usize>,
    pub seeds: Vec<u64>,
    pub space: HyperParamSpace,
    /// Row-major, one per trial.
    pub cells: Vec<Value>,
}

/// All seeds' outputs for one hyperparameter combination.
#[derive(Debug, Clone)]
pub struct Run<'a> {
    pub label: String,
    pub combination: Combination,
    pub outputs: Vec<&'a Value>,
}

impl SweepOutput {
    /// Output at a full multi-index `[seed, i1, i2, ...]`.
    pub fn get(&self, index: &[usize]) -> Option<&Value> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        self.cells.get(flat)
    }

    /// Fold the cells into one tree whose leaves carry the leading dimensions.
    ///
    /// `{"loss": 0.1}` per cell becomes `{"loss": [[..], [..]]}` nested as
    /// `shape`, the same layout a vectorized call would have produced.
    pub fn stacked(&self) -> Result<Value, SweepError> {
        let cells: Vec<&Value> = self.cells.iter().collect();
        stack(&cells, &self.shape, "")
    }

    /// Per-combination view across seeds, in grid order.
    pub fn runs(&self) -> Vec<Run<'_>> {
        let per_seed = self.space.num_combinations();
        self.space
            .combinations()
            .enumerate()
            .map(|(offset, combination)| Run {
                label: self.space.label(&combination),
                outputs: self
                    .cells
                    .iter()
                    .skip(offset)
                    .step_by(per_seed)
                    .collect(),
                combination,
            })
            .collect()
    }

    /// Mean over the seed axis of the leaf at `path` (`metrics/returns`),
    /// one entry per combination. Arrays are averaged elementwise.
    pub fn seed_mean(&self, path: &str) -> Result<Vec<(String, Value)>, SweepError> {
        let pointer = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.runs()
            .into_iter()
            .map(|run| {
                let leaves = run
                    .outputs
                    .iter()
                    .map(|output| {
                        output.pointer(&pointer).ok_or_else(|| {
                            SweepError::output_shape(format!(
                                "run '{}' has no value at '{path}'",
                                run.label
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((run.label, mean(&leaves, path)?))
            })
            .collect()
    }
}

fn stack(cells: &[&Value], shape: &[usize], at: &str) -> Result<Value, SweepError> {
    let Some(first) = cells.first() else {
        return Err(SweepError::output_shape("sweep produced no outputs"));
    };

    if let Value::Object(keys) = first {
        let same_keys = |cell: &&Value| {
            cell.as_object().is_some_and(|object| {
                object.len() == keys.len() && keys.keys().all(|key| object.contains_key(key))
            })
        };
        if !cells.iter().all(same_keys) {
            return Err(SweepError::output_shape(format!(
                "outputs disagree on keys at '{}'",
                if at.is_empty() { "/" } else { at }
            )));
        }

        let mut stacked = Map::new();
        for key in keys.keys() {
            let children = cells
                .iter()
                .map(|cell| {
                    cell.get(key).ok_or_else(|| {
                        SweepError::output_shape(format!("missing '{at}/{key}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            stacked.insert(key.clone(), stack(&children, shape, &format!("{at}/{key}"))?);
        }
        return Ok(Value::Object(stacked));
    }

    if cells.iter().any(|cell| cell.is_object()) {
        return Err(SweepError::output_shape(format!(
            "outputs mix objects and leaves at '{at}'"
        )));
    }
    debug!(path = at, cells = cells.len(), "Stacking leaf");
    Ok(nest(cells, shape))
}

fn nest(cells: &[&Value], shape: &[usize]) -> Value {
    match shape.split_first() {
        None => cells.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        Some((_, rest)) => {
            let chunk = rest.iter().product::<usize>().max(1);
            Value::Array(cells.chunks(chunk).map(|c| nest(c, rest)).collect())
        }
    }
}

/// Nulls (diverged runs) are left out of the mean; all-null gives null.
fn mean(leaves: &[&Value], path: &str) -> Result<Value, SweepError> {
    if leaves.iter().all(|v| v.is_number() || v.is_null()) {
        let finite: Vec<f64> = leaves.iter().filter_map(|v| v.as_f64()).collect();
        if finite.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(Value::from(finite.iter().sum::<f64>() / finite.len() as f64));
    }

    let arrays = leaves
        .iter()
        .map(|v| v.as_array())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SweepError::output_shape(format!("'{path}' is not numeric")))?;
    let len = arrays.first().map_or(0, |a| a.len());
    if arrays.iter().any(|a| a.len() != len) {
        return Err(SweepError::output_shape(format!(
            "'{path}' has different lengths across seeds"
        )));
    }
    (0..len)
        .map(|i| {
            let column: Vec<&Value> = arrays.iter().map(|a| &a[i]).collect();
            mean(&column, path)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FnBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn space() -> HyperParamSpace {
        HyperParamSpace::new()
            .with("LR", vec![0.01, 0.001, 0.0001])
            .unwrap()
            .with("MAX_GRAD_NORM", vec![10_i64, 1])
            .unwrap()
    }

    fn sweep(seeds: usize) -> HyperparamSweep {
        let mut config = TrainConfig::new();
        config.insert("LR", 2.5e-4);
        config.insert("NUM_ENVS", 4);
        HyperparamSweep::new(
            config,
            space(),
            SweepOptions {
                seeds_per_exp: seeds,
                root_seed: 0,
            },
        )
    }

    fn echo() -> FnBackend<impl Fn(&TrainConfig, &Trial) -> Result<Value, SweepError>> {
        FnBackend::new("echo", |config: &TrainConfig, trial: &Trial| {
            Ok(json!({
                "metrics": {
                    "lr": config.get_f64("LR"),
                    "returns": [trial.seed_index as f64, 2.0 * trial.seed_index as f64],
                },
                "num_envs": config.get_i64("NUM_ENVS"),
            }))
        })
    }

    #[test]
    fn test_trials_seed_axis_outermost() {
        let trials = sweep(2).trials();
        assert_eq!(trials.len(), 12);
        assert_eq!(trials[0].seed_index, 0);
        assert_eq!(trials[5].seed_index, 0);
        assert_eq!(trials[6].seed_index, 1);
        assert_eq!(trials[1].indices, vec![0, 1]);
        assert_eq!(trials[2].indices, vec![1, 0]);
        assert!(trials.iter().enumerate().all(|(i, t)| t.index == i));
        assert_ne!(trials[0].seed, trials[6].seed);
    }

    #[tokio::test]
    async fn test_output_shape_is_seeds_then_params() {
        let output = sweep(2).run(&echo()).await.unwrap();
        assert_eq!(output.shape, vec![2, 3, 2]);
        assert_eq!(output.axes, vec!["seed", "LR", "MAX_GRAD_NORM"]);
        assert_eq!(output.cells.len(), 12);
        assert_eq!(output.seeds.len(), 2);
    }

    #[tokio::test]
    async fn test_get_by_multi_index() {
        let output = sweep(2).run(&echo()).await.unwrap();
        let cell = output.get(&[1, 2, 0]).unwrap();
        assert_eq!(cell["metrics"]["lr"], json!(0.0001));
        assert_eq!(cell["metrics"]["returns"], json!([1.0, 2.0]));
        assert!(output.get(&[2, 0, 0]).is_none());
        assert!(output.get(&[0, 0]).is_none());
    }

    #[tokio::test]
    async fn test_stacked_leaves_carry_leading_dims() {
        let output = sweep(2).run(&echo()).await.unwrap();
        let stacked = output.stacked().unwrap();

        let lr = stacked["metrics"]["lr"].as_array().unwrap();
        assert_eq!(lr.len(), 2);
        assert_eq!(lr[0].as_array().unwrap().len(), 3);
        assert_eq!(lr[0][1].as_array().unwrap().len(), 2);
        assert_eq!(lr[1][1][0], json!(0.001));
        assert_eq!(stacked["num_envs"][0][0][0], json!(4));
        // Array leaves keep their own trailing dimension.
        assert_eq!(stacked["metrics"]["returns"][1][0][0], json!([1.0, 2.0]));
    }

    #[tokio::test]
    async fn test_runs_group_seeds_per_combination() {
        let output = sweep(3).run(&echo()).await.unwrap();
        let runs = output.runs();
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].label, "LR=0.01000_MAX_GRAD_NORM=10.00000");
        assert_eq!(runs[5].label, "LR=0.00010_MAX_GRAD_NORM=1.00000");
        assert!(runs.iter().all(|run| run.outputs.len() == 3));
        assert_eq!(runs[4].outputs[2]["metrics"]["lr"], json!(0.0001));
    }

    #[tokio::test]
    async fn test_seed_mean_over_arrays() {
        let output = sweep(3).run(&echo()).await.unwrap();
        let means = output.seed_mean("metrics/returns").unwrap();
        assert_eq!(means.len(), 6);
        assert_eq!(means[0].1, json!([1.0, 2.0]));

        let lr = output.seed_mean("/metrics/lr").unwrap();
        assert_eq!(lr[2].0, "LR=0.00100_MAX_GRAD_NORM=10.00000");
        assert!((lr[2].1.as_f64().unwrap() - 0.001).abs() < 1e-12);

        assert!(output.seed_mean("metrics/missing").is_err());
    }

    #[tokio::test]
    async fn test_empty_space_still_sweeps_seeds() {
        let sweep = HyperparamSweep::new(
            TrainConfig::new(),
            HyperParamSpace::new(),
            SweepOptions {
                seeds_per_exp: 4,
                root_seed: 1,
            },
        );
        let output = sweep.run(&echo()).await.unwrap();
        assert_eq!(output.shape, vec![4]);
        assert_eq!(output.runs().len(), 1);
        assert_eq!(output.runs()[0].outputs.len(), 4);
        assert_eq!(output.stacked().unwrap()["num_envs"], json!([null, null, null, null]));
    }

    #[tokio::test]
    async fn test_zero_seeds_rejected() {
        let err = sweep(0).run(&echo()).await.unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[tokio::test]
    async fn test_short_batch_is_an_error() {
        let backend = FnBackend::new("short", |_: &TrainConfig, _: &Trial| Ok(json!(0)));
        struct Truncating<B>(B);
        #[async_trait::async_trait]
        impl<B: TrainBackend> TrainBackend for Truncating<B> {
            fn name(&self) -> &str {
                "truncating"
            }
            async fn train_batch(
                &self,
                config: &TrainConfig,
                trials: &[Trial],
            ) -> Result<Vec<Value>, SweepError> {
                let mut out = self.0.train_batch(config, trials).await?;
                out.pop();
                Ok(out)
            }
        }

        let err = sweep(1).run(&Truncating(backend)).await.unwrap_err();
        assert!(matches!(
            err,
            SweepError::BatchSize {
                expected: 6,
                got: 5
            }
        ));
    }

    #[test]
    fn test_empty_first_object_does_not_hide_keys() {
        let output = SweepOutput {
            axes: vec![SEED_AXIS.to_string()],
            shape: vec![2],
            seeds: vec![0, 1],
            space: HyperParamSpace::new(),
            cells: vec![json!({}), json!({"a": 1})],
        };
        assert!(matches!(output.stacked(), Err(SweepError::OutputShape(_))));
    }

    #[test]
    fn test_nested_key_sets_must_match() {
        let output = SweepOutput {
            axes: vec![SEED_AXIS.to_string()],
            shape: vec![2],
            seeds: vec![0, 1],
            space: HyperParamSpace::new(),
            cells: vec![
                json!({"metrics": {"loss": 1.0}}),
                json!({"metrics": {"loss": 2.0, "extra": 0}}),
            ],
        };
        assert!(matches!(output.stacked(), Err(SweepError::OutputShape(_))));
    }

    #[test]
    fn test_seed_mean_skips_diverged_runs() {
        let output = SweepOutput {
            axes: vec![SEED_AXIS.to_string()],
            shape: vec![3],
            seeds: vec![0, 1, 2],
            space: HyperParamSpace::new(),
            cells: vec![
                json!({"loss": 1.0, "curve": [1.0, null]}),
                json!({"loss": null, "curve": [3.0, null]}),
                json!({"loss": 3.0, "curve": [2.0, null]}),
            ],
        };
        assert_eq!(output.seed_mean("loss").unwrap()[0].1, json!(2.0));
        assert_eq!(output.seed_mean("curve").unwrap()[0].1, json!([2.0, null]));
    }

    #[tokio::test]
    async fn test_mismatched_structure_fails_to_stack() {
        let backend = FnBackend::new("ragged", |_: &TrainConfig, trial: &Trial| {
            if trial.index == 0 {
                Ok(json!({"a": 1}))
            } else {
                Ok(json!({"b": 1}))
            }
        });
        let output = sweep(1).run(&backend).await.unwrap();
        assert!(matches!(output.stacked(), Err(SweepError::OutputShape(_))));
    }
}
