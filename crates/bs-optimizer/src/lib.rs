//! # bs-optimizer
//!
//! Hyperparameter sweeps for BoostSweep.
//!
//! Provides search space definitions and grid expansion, per-setting
//! time-series cross-validation, the sweep loop with its per-iteration
//! Parquet checkpoint, and sweep configuration.

pub mod config;
pub mod defaults;
pub mod progress;
pub mod results;
pub mod runner;
pub mod search;
pub mod status;
pub mod sweep;

pub use config::{CvConfig, DataConfig, SweepConfig, ToolPaths};
pub use defaults::{baseline, Device};
pub use progress::ProgressReport;
pub use results::{ResultRow, ResultsTable};
pub use runner::{cross_validate, evaluate};
pub use search::{ParameterDef, ParameterGrid, ParameterKind, SearchSpace};
pub use status::{SweepId, SweepState, SweepStatus};
pub use sweep::{
    persist_partitions, run_config, run_sweep, SweepOutcome, SweepSettings, HOLDOUT_TAG,
    TRAIN_TAG,
};
