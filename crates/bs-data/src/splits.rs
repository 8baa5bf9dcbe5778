//! Time-ordered partitioning: holdout removal and expanding-window K-fold.

use bs_types::{BsResult, DataError, FoldSplit, Frame};
use serde::{Deserialize, Serialize};

/// Expanding-window cross-validation splitter for time-ordered rows.
///
/// Each fold trains on every row before its test block (minus `gap`
/// rows), so no fold ever looks ahead. Test blocks are consecutive and of
/// equal size, `n_samples / (n_splits + 1)` unless `test_size` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesSplit {
    pub n_splits: usize,
    #[serde(default)]
    pub gap: usize,
    #[serde(default)]
    pub max_train_size: Option<usize>,
    #[serde(default)]
    pub test_size: Option<usize>,
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            gap: 0,
            max_train_size: None,
            test_size: None,
        }
    }

    pub fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_max_train_size(mut self, max_train_size: usize) -> Self {
        self.max_train_size = Some(max_train_size);
        self
    }

    pub fn with_test_size(mut self, test_size: usize) -> Self {
        self.test_size = Some(test_size);
        self
    }

    /// Produce `n_splits` ordered folds over `n_samples` rows.
    pub fn split(&self, n_samples: usize) -> BsResult<Vec<FoldSplit>> {
        if self.n_splits == 0 {
            return Err(DataError::InsufficientData {
                message: "n_splits must be at least 1".to_string(),
            }
            .into());
        }

        let n_folds = self.n_splits + 1;
        if n_folds > n_samples {
            return Err(DataError::InsufficientData {
                message: format!(
                    "cannot have {} folds with only {} samples",
                    n_folds, n_samples
                ),
            }
            .into());
        }

        let test_size = self.test_size.unwrap_or(n_samples / n_folds);
        let needed = test_size * self.n_splits + self.gap;
        if test_size == 0 || needed >= n_samples {
            return Err(DataError::InsufficientData {
                message: format!(
                    "{} samples leave no training rows for {} splits of size {} with gap {}",
                    n_samples, self.n_splits, test_size, self.gap
                ),
            }
            .into());
        }

        let first_test_start = n_samples - self.n_splits * test_size;
        let folds = (0..self.n_splits)
            .map(|fold| {
                let test_start = first_test_start + fold * test_size;
                let train_end = test_start - self.gap;
                let train_start = match self.max_train_size {
                    Some(max) if max < train_end => train_end - max,
                    _ => 0,
                };
                FoldSplit {
                    fold,
                    train: (train_start..train_end).collect(),
                    test: (test_start..test_start + test_size).collect(),
                }
            })
            .collect();

        Ok(folds)
    }
}

/// Split off the trailing `fraction` of rows as a holdout partition.
///
/// Returns `(train, holdout)`. A fraction of zero yields an empty holdout.
pub fn split_holdout(frame: &Frame, fraction: f64) -> BsResult<(Frame, Frame)> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(DataError::InvalidFormat {
            message: format!("holdout fraction must be in [0, 1), got {fraction}"),
        }
        .into());
    }

    let n_rows = frame.n_rows();
    let n_holdout = (n_rows as f64 * fraction).round() as usize;
    let cut = n_rows - n_holdout.min(n_rows);
    if cut == 0 {
        return Err(DataError::InsufficientData {
            message: format!("holdout of {n_holdout} rows leaves no training rows"),
        }
        .into());
    }

    Ok((frame.slice(0..cut)?, frame.slice(cut..n_rows)?))
}
