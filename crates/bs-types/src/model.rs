use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::{BsError, BsResult, DataError};

/// The gradient-boosting library driving model fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    LightGbm,
    XgBoost,
    CatBoost,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::LightGbm, Self::XgBoost, Self::CatBoost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LightGbm => "lightgbm",
            Self::XgBoost => "xgboost",
            Self::CatBoost => "catboost",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lightgbm" | "lgbm" | "lgb" => Ok(Self::LightGbm),
            "xgboost" | "xgb" => Ok(Self::XgBoost),
            "catboost" | "cb" => Ok(Self::CatBoost),
            other => Err(BsError::Config(format!("unknown backend: {other}"))),
        }
    }
}

/// How categorical input columns are encoded before training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// One integer code per distinct value, kept as a single categorical column.
    #[default]
    Factorize,
    /// One indicator column per distinct value.
    OneHot,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factorize => "factorize",
            Self::OneHot => "onehot",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = BsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "factorize" => Ok(Self::Factorize),
            "onehot" | "one-hot" => Ok(Self::OneHot),
            other => Err(BsError::Config(format!("unknown encoding: {other}"))),
        }
    }
}

/// One train/validation partition produced by a fold splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl FoldSplit {
    /// Check that both index sets fall inside `n_rows` and do not overlap.
    pub fn validate(&self, n_rows: usize) -> BsResult<()> {
        let mut seen = HashSet::with_capacity(self.train.len());
        for &index in &self.train {
            if index >= n_rows {
                return Err(DataError::IndexOutOfRange {
                    index,
                    rows: n_rows,
                }
                .into());
            }
            seen.insert(index);
        }
        for &index in &self.test {
            if index >= n_rows {
                return Err(DataError::IndexOutOfRange {
                    index,
                    rows: n_rows,
                }
                .into());
            }
            if seen.contains(&index) {
                return Err(DataError::OverlappingFold {
                    fold: self.fold,
                    index,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Best-checkpoint scores for one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub rounds: usize,
    pub train_auc: f64,
    pub valid_auc: f64,
}

/// Mean and sample standard deviation of fold scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub rounds_mean: f64,
    pub rounds_std: f64,
    pub train_auc_mean: f64,
    pub train_auc_std: f64,
    pub valid_auc_mean: f64,
    pub valid_auc_std: f64,
}

impl CvSummary {
    pub const COLUMNS: [&'static str; 6] = [
        "rounds_mean",
        "rounds_std",
        "train_auc_mean",
        "train_auc_std",
        "valid_auc_mean",
        "valid_auc_std",
    ];

    pub fn from_scores(scores: &[FoldScore]) -> Self {
        let rounds: Vec<f64> = scores.iter().map(|s| s.rounds as f64).collect();
        let train: Vec<f64> = scores.iter().map(|s| s.train_auc).collect();
        let valid: Vec<f64> = scores.iter().map(|s| s.valid_auc).collect();

        Self {
            rounds_mean: mean(&rounds),
            rounds_std: sample_std(&rounds),
            train_auc_mean: mean(&train),
            train_auc_std: sample_std(&train),
            valid_auc_mean: mean(&valid),
            valid_auc_std: sample_std(&valid),
        }
    }

    /// Values in `COLUMNS` order.
    pub fn values(&self) -> [f64; 6] {
        [
            self.rounds_mean,
            self.rounds_std,
            self.train_auc_mean,
            self.train_auc_std,
            self.valid_auc_mean,
            self.valid_auc_std,
        ]
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

// ddof = 1; undefined for fewer than two observations
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}
