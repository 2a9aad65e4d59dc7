//! # marlkit-sweep: hyperparameter sweeps for MARL training
//!
//! Runs a training function for every seed crossed with every combination of
//! a hyperparameter grid and lays the results out as `[seed, p1, p2, ...]`.
//!
//! Two ways in:
//! - **Rust training functions**: wrap a closure in [`FnBackend`]; it gets the
//!   base config with the trial's hyperparameters written over it.
//! - **Python training scripts**: [`hyperparam_search`] patches the script so
//!   its inner `train` function takes the swept hyperparameters as parameters,
//!   then runs the patched module through [`PythonBackend`].

pub mod backend;
pub mod error;
pub mod patch;
pub mod python;
pub mod runtime;
pub mod search;
pub mod seed;
pub mod space;
pub mod sweep;
pub mod trial;

pub use backend::{FnBackend, TrainBackend};
pub use error::SweepError;
pub use patch::{PatchOptions, PatchReport, PatchedModule, patch_source, patched_path, write_patched};
pub use python::PythonBackend;
pub use runtime::PythonRuntime;
pub use search::{SearchRequest, hyperparam_search};
pub use seed::split_seed;
pub use space::{Combination, HyperParamSpace, ParamValue, ParamValues};
pub use sweep::{HyperparamSweep, Run, SweepOptions, SweepOutput};
pub use trial::{TrainConfig, Trial};
