//! Sweep configuration, read from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bs_data::{LoadOptions, TimeSeriesSplit};
use bs_engine::TrainingBudget;
use bs_types::{config_error, BackendKind, BsResult, Encoding, ParamSet};

use crate::defaults::{baseline, Device};
use crate::search::SearchSpace;

const APP_DIR: &str = "boostsweep";

/// Input table and how to split it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// CSV or Parquet file, rows in time order.
    pub path: PathBuf,
    pub target: String,
    #[serde(default)]
    pub categorical: Vec<String>,
    /// Columns removed before training (timestamps, identifiers).
    #[serde(default)]
    pub drop: Vec<String>,
    /// Trailing fraction of rows held out before cross-validation.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
}

fn default_holdout_fraction() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvConfig {
    pub n_splits: usize,
    #[serde(default)]
    pub gap: usize,
    #[serde(default)]
    pub max_train_size: Option<usize>,
    #[serde(default)]
    pub budget: TrainingBudget,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            gap: 0,
            max_train_size: None,
            budget: TrainingBudget::default(),
        }
    }
}

/// Executables of the backend tools; bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub lightgbm: PathBuf,
    pub xgboost: PathBuf,
    pub catboost: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            lightgbm: PathBuf::from("lightgbm"),
            xgboost: PathBuf::from("xgboost"),
            catboost: PathBuf::from("catboost"),
        }
    }
}

impl ToolPaths {
    pub fn program(&self, backend: BackendKind) -> &Path {
        match backend {
            BackendKind::LightGbm => &self.lightgbm,
            BackendKind::XgBoost => &self.xgboost,
            BackendKind::CatBoost => &self.catboost,
        }
    }
}

/// Top-level configuration for a sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub name: String,
    pub backend: BackendKind,
    #[serde(default)]
    pub encoding: Encoding,
    pub data: DataConfig,
    #[serde(default)]
    pub cv: CvConfig,
    pub search_space: SearchSpace,
    /// Applied on top of the backend baseline, below the swept values.
    #[serde(default)]
    pub baseline_overrides: ParamSet,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub max_trials: Option<usize>,
    #[serde(default)]
    pub store_root: Option<PathBuf>,
    #[serde(default = "default_result_tag")]
    pub result_tag: String,
    /// Scratch directory for fold containers and models.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

fn default_result_tag() -> String {
    "results".to_string()
}

fn default_leaderboard_size() -> usize {
    5
}

impl SweepConfig {
    pub fn new(
        name: impl Into<String>,
        backend: BackendKind,
        data: DataConfig,
        search_space: SearchSpace,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            encoding: Encoding::default(),
            data,
            cv: CvConfig::default(),
            search_space,
            baseline_overrides: ParamSet::new(),
            device: Device::default(),
            seed: None,
            max_trials: None,
            store_root: None,
            result_tag: default_result_tag(),
            work_dir: None,
            tools: ToolPaths::default(),
            leaderboard_size: default_leaderboard_size(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> BsResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = Some(root.into());
        self
    }

    pub fn with_cv(mut self, cv: CvConfig) -> Self {
        self.cv = cv;
        self
    }

    pub fn validate(&self) -> BsResult<()> {
        if self.search_space.is_empty() {
            return Err(config_error!("search space declares no parameters"));
        }
        self.search_space.validate()?;
        if self.cv.n_splits == 0 {
            return Err(config_error!("cv.n_splits must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.data.holdout_fraction) {
            return Err(config_error!(
                "data.holdout_fraction must be in [0, 1), got {}",
                self.data.holdout_fraction
            ));
        }
        if self.cv.budget.max_rounds == 0 {
            return Err(config_error!("cv.budget.max_rounds must be at least 1"));
        }
        if self.result_tag.is_empty() || self.result_tag.contains(['/', '\\']) {
            return Err(config_error!("invalid result tag {:?}", self.result_tag));
        }
        Ok(())
    }

    /// Configured store root, else `<data dir>/boostsweep`.
    pub fn store_root(&self) -> PathBuf {
        self.store_root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR).join(&self.name))
    }

    /// Backend baseline with configured overrides applied.
    pub fn baseline(&self) -> ParamSet {
        baseline(self.backend, self.device).merged(&self.baseline_overrides)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::new(self.data.target.clone())
            .with_categorical(self.data.categorical.clone())
            .with_drop(self.data.drop.clone())
            .with_encoding(self.encoding)
    }

    pub fn splitter(&self) -> TimeSeriesSplit {
        let split = TimeSeriesSplit::new(self.cv.n_splits).with_gap(self.cv.gap);
        match self.cv.max_train_size {
            Some(max) => split.with_max_train_size(max),
            None => split,
        }
    }
}
