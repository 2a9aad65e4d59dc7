//! Training backends: whatever actually runs a batch of trials.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::SweepError;
use crate::trial::{TrainConfig, Trial};

/// Runs a batch of trials and returns one structured output per trial, in order.
///
/// How the batch is executed (sequentially, in parallel, vectorized by a
/// numerical framework) is up to the implementation.
#[async_trait]
pub trait TrainBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn train_batch(
        &self,
        config: &TrainConfig,
        trials: &[Trial],
    ) -> Result<Vec<Value>, SweepError>;
}

/// Backend around a plain Rust training function.
///
/// The function receives the base config with the trial's hyperparameters
/// already written over it, plus the trial itself for its seed.
pub struct FnBackend<F> {
    name: String,
    train: F,
}

impl<F> FnBackend<F>
where
    F: Fn(&TrainConfig, &Trial) -> Result<Value, SweepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, train: F) -> Self {
        Self {
            name: name.into(),
            train,
        }
    }
}

#[async_trait]
impl<F> TrainBackend for FnBackend<F>
where
    F: Fn(&TrainConfig, &Trial) -> Result<Value, SweepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn train_batch(
        &self,
        config: &TrainConfig,
        trials: &[Trial],
    ) -> Result<Vec<Value>, SweepError> {
        trials
            .iter()
            .map(|trial| {
                debug!(backend = %self.name, trial = trial.index, seed = trial.seed, "Training");
                (self.train)(&config.with_overrides(trial), trial)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParamValue;
    use indexmap::IndexMap;
    use serde_json::json;

    fn trial(index: usize, lr: f64) -> Trial {
        let mut params = IndexMap::new();
        params.insert("LR".to_string(), ParamValue::Float(lr));
        Trial {
            index,
            seed_index: 0,
            seed: index as u64,
            indices: vec![index],
            params,
        }
    }

    #[tokio::test]
    async fn test_fn_backend_sees_overridden_config() {
        let backend = FnBackend::new("echo", |config: &TrainConfig, trial: &Trial| {
            Ok(json!({"lr": config.get_f64("LR"), "seed": trial.seed}))
        });
        let mut config = TrainConfig::new();
        config.insert("LR", 0.5);

        let outputs = backend
            .train_batch(&config, &[trial(0, 0.1), trial(1, 0.2)])
            .await
            .unwrap();
        assert_eq!(
            outputs,
            vec![json!({"lr": 0.1, "seed": 0}), json!({"lr": 0.2, "seed": 1})]
        );
        assert_eq!(backend.name(), "echo");
    }

    #[tokio::test]
    async fn test_fn_backend_propagates_failure() {
        let backend = FnBackend::new("failing", |_: &TrainConfig, trial: &Trial| {
            if trial.index == 1 {
                Err(SweepError::training("diverged"))
            } else {
                Ok(json!(null))
            }
        });
        let err = backend
            .train_batch(&TrainConfig::new(), &[trial(0, 0.1), trial(1, 0.2)])
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::Training(_)));
    }
}
