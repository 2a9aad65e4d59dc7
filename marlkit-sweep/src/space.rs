//! Hyperparameter spaces and the Cartesian grid over them.
//!
//! A space is an ordered mapping from parameter name to its candidate values.
//! Insertion order is axis order everywhere: in the patched signature, in the
//! trial batch and in the leading dimensions of a sweep's output.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SweepError;

/// Candidate values for one hyperparameter. Homogeneous by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ParamValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ParamValue> {
        match self {
            Self::Int(v) => v.get(index).copied().map(ParamValue::Int),
            Self::Float(v) => v.get(index).copied().map(ParamValue::Float),
        }
    }
}

impl From<Vec<f64>> for ParamValues {
    fn from(values: Vec<f64>) -> Self {
        Self::Float(values)
    }
}

impl From<Vec<i64>> for ParamValues {
    fn from(values: Vec<i64>) -> Self {
        Self::Int(values)
    }
}

/// A single hyperparameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn to_json(self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(v),
            Self::Float(v) => serde_json::Value::from(v),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered mapping from hyperparameter name to candidate values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, ParamValues>",
    into = "IndexMap<String, ParamValues>"
)]
pub struct HyperParamSpace {
    axes: IndexMap<String, ParamValues>,
}

impl HyperParamSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis. Re-inserting a name replaces its values but keeps its position.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: impl Into<ParamValues>,
    ) -> Result<(), SweepError> {
        let name = name.into();
        let values = values.into();
        if name.trim().is_empty() {
            return Err(SweepError::invalid_space("parameter name must not be empty"));
        }
        if values.is_empty() {
            return Err(SweepError::invalid_space(format!(
                "parameter '{name}' has no candidate values"
            )));
        }
        self.axes.insert(name, values);
        Ok(())
    }

    /// Builder-style [`HyperParamSpace::insert`].
    pub fn with(
        mut self,
        name: impl Into<String>,
        values: impl Into<ParamValues>,
    ) -> Result<Self, SweepError> {
        self.insert(name, values)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.axes.keys().map(String::as_str).collect()
    }

    pub fn values(&self, name: &str) -> Option<&ParamValues> {
        self.axes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValues)> {
        self.axes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Candidate count per axis, in axis order.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.values().map(ParamValues::len).collect()
    }

    /// Size of the full grid. An empty space has exactly one (empty) combination.
    pub fn num_combinations(&self) -> usize {
        self.axes.values().map(ParamValues::len).product()
    }

    /// Values at the given per-axis indices.
    pub fn values_at(&self, indices: &[usize]) -> Option<Vec<ParamValue>> {
        if indices.len() != self.axes.len() {
            return None;
        }
        self.axes
            .values()
            .zip(indices)
            .map(|(values, &i)| values.get(i))
            .collect()
    }

    /// All grid points, last axis varying fastest.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            space: self,
            next: Some(vec![0; self.axes.len()]),
        }
    }

    /// Run label of the form `LR=0.01000_MAX_GRAD_NORM=10.00000`.
    pub fn label(&self, combination: &Combination) -> String {
        self.axes
            .keys()
            .zip(&combination.values)
            .map(|(name, value)| format!("{name}={:.5}", value.as_f64()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl TryFrom<IndexMap<String, ParamValues>> for HyperParamSpace {
    type Error = SweepError;

    fn try_from(axes: IndexMap<String, ParamValues>) -> Result<Self, Self::Error> {
        let mut space = Self::new();
        for (name, values) in axes {
            space.insert(name, values)?;
        }
        Ok(space)
    }
}

impl From<HyperParamSpace> for IndexMap<String, ParamValues> {
    fn from(space: HyperParamSpace) -> Self {
        space.axes
    }
}

/// One point of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub indices: Vec<usize>,
    pub values: Vec<ParamValue>,
}

/// Iterator over the grid, see [`HyperParamSpace::combinations`].
pub struct Combinations<'a> {
    space: &'a HyperParamSpace,
    next: Option<Vec<usize>>,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let indices = self.next.take()?;
        let values = self.space.values_at(&indices)?;

        let shape = self.space.shape();
        let mut following = indices.clone();
        let mut advanced = false;
        for axis in (0..following.len()).rev() {
            following[axis] += 1;
            if following[axis] < shape[axis] {
                advanced = true;
                break;
            }
            following[axis] = 0;
        }
        if advanced {
            self.next = Some(following);
        }

        Some(Combination { indices, values })
    }
}
