//! Training configuration and the per-cell trial description.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::space::ParamValue;

/// Base configuration handed to a training function.
///
/// Keys that match a swept hyperparameter are replaced per trial by
/// [`TrainConfig::with_overrides`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainConfig {
    entries: IndexMap<String, Value>,
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries.get(key).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of this config with the trial's hyperparameters written over it.
    pub fn with_overrides(&self, trial: &Trial) -> Self {
        let mut merged = self.clone();
        for (name, value) in &trial.params {
            merged.entries.insert(name.clone(), value.to_json());
        }
        merged
    }
}

impl FromIterator<(String, Value)> for TrainConfig {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One cell of a sweep: a seed crossed with one hyperparameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Row-major position in the sweep output.
    pub index: usize,
    /// Position along the seed axis.
    pub seed_index: usize,
    /// Sub-seed for this run.
    pub seed: u64,
    /// Position along each hyperparameter axis, in space order.
    pub indices: Vec<usize>,
    /// Hyperparameter values by name, in space order.
    pub params: IndexMap<String, ParamValue>,
}

impl Trial {
    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name).copied()
    }
}
