//! The backend seam: one implementation per gradient-boosting library.

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::info;

use bs_types::{BackendKind, BsResult, FoldScore, FoldSplit, Frame, ParamSet};

/// Default per-fold boosting budget.
pub const DEFAULT_MAX_ROUNDS: usize = 250;
/// Default early-stopping patience, in rounds.
pub const DEFAULT_EARLY_STOPPING_ROUNDS: usize = 25;

/// Per-fold training budget shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingBudget {
    pub max_rounds: usize,
    pub early_stopping_rounds: usize,
}

impl Default for TrainingBudget {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            early_stopping_rounds: DEFAULT_EARLY_STOPPING_ROUNDS,
        }
    }
}

/// Train/validation containers for one fold, in a backend's native format.
#[derive(Debug, Clone)]
pub struct FoldDataset<C> {
    pub fold: usize,
    pub train: C,
    pub valid: C,
    pub train_rows: usize,
    pub valid_rows: usize,
}

/// A gradient-boosting library driving model fitting.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Native, fully materialized dataset handle.
    type Container: Debug + Send + Sync;

    fn kind(&self) -> BackendKind;

    /// Materialize one fold's train/validation containers.
    fn build_dataset(
        &self,
        fold: usize,
        train: &Frame,
        valid: &Frame,
    ) -> BsResult<FoldDataset<Self::Container>>;

    /// Fill in parameters that depend on swept values.
    fn derive_params(&self, _params: &mut ParamSet) -> BsResult<()> {
        Ok(())
    }

    /// Fit one model on the fold's training container with early stopping
    /// on the validation container and report best-checkpoint scores.
    async fn train_and_score(
        &self,
        params: &ParamSet,
        dataset: &FoldDataset<Self::Container>,
        budget: &TrainingBudget,
    ) -> BsResult<FoldScore>;
}

/// Build one `{train, valid}` container pair per fold.
///
/// Every split is validated against the frame first; any out-of-range row
/// or unknown categorical column fails the whole build. Folds are
/// materialized in parallel and returned in split order.
pub fn build_fold_datasets<B: Backend>(
    backend: &B,
    frame: &Frame,
    splits: &[FoldSplit],
) -> BsResult<Vec<FoldDataset<B::Container>>> {
    for split in splits {
        split.validate(frame.n_rows())?;
    }

    info!(
        "Building {} fold datasets for {} ({} rows, {} features)",
        splits.len(),
        backend.kind(),
        frame.n_rows(),
        frame.n_cols()
    );

    splits
        .par_iter()
        .map(|split| {
            let train = frame.take(&split.train)?;
            let valid = frame.take(&split.test)?;
            backend.build_dataset(split.fold, &train, &valid)
        })
        .collect()
}
