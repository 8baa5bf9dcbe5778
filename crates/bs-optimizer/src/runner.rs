//! Cross-validation of one parameter setting over pre-built folds.

use bs_engine::{Backend, FoldDataset, TrainingBudget};
use bs_types::{BsResult, CvSummary, FoldScore, ParamSet, SearchError};
use tracing::debug;

/// Train and score one model per fold, sequentially.
///
/// Any fold failure aborts the evaluation; no fold is retried.
pub async fn cross_validate<B: Backend>(
    backend: &B,
    params: &ParamSet,
    folds: &[FoldDataset<B::Container>],
    n_folds: usize,
    budget: &TrainingBudget,
) -> BsResult<Vec<FoldScore>> {
    if folds.len() != n_folds {
        return Err(SearchError::FoldCountMismatch {
            expected: n_folds,
            actual: folds.len(),
        }
        .into());
    }

    let mut scores = Vec::with_capacity(n_folds);
    for dataset in folds {
        let score = backend.train_and_score(params, dataset, budget).await?;
        debug!(
            "{} fold {}: rounds={} train_auc={:.5} valid_auc={:.5}",
            backend.kind(),
            dataset.fold,
            score.rounds,
            score.train_auc,
            score.valid_auc
        );
        scores.push(score);
    }
    Ok(scores)
}

/// Cross-validate and aggregate to mean / sample std per column.
pub async fn evaluate<B: Backend>(
    backend: &B,
    params: &ParamSet,
    folds: &[FoldDataset<B::Container>],
    budget: &TrainingBudget,
) -> BsResult<CvSummary> {
    let scores = cross_validate(backend, params, folds, folds.len(), budget).await?;
    Ok(CvSummary::from_scores(&scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bs_types::{BackendError, BackendKind, BsError, Frame};

    /// Scores each fold from its index; fails on a configured fold.
    struct FoldIndexBackend {
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl Backend for FoldIndexBackend {
        type Container = ();

        fn kind(&self) -> BackendKind {
            BackendKind::XgBoost
        }

        fn build_dataset(
            &self,
            fold: usize,
            train: &Frame,
            valid: &Frame,
        ) -> BsResult<FoldDataset<()>> {
            Ok(FoldDataset {
                fold,
                train: (),
                valid: (),
                train_rows: train.n_rows(),
                valid_rows: valid.n_rows(),
            })
        }

        async fn train_and_score(
            &self,
            _params: &ParamSet,
            dataset: &FoldDataset<()>,
            _budget: &TrainingBudget,
        ) -> BsResult<FoldScore> {
            if self.fail_on == Some(dataset.fold) {
                return Err(BackendError::ToolFailed {
                    tool: "xgboost".into(),
                    status: "exit status: 1".into(),
                    stderr: "bad param".into(),
                }
                .into());
            }
            Ok(FoldScore {
                rounds: 10 * (dataset.fold + 1),
                train_auc: 0.9,
                valid_auc: 0.6 + 0.1 * dataset.fold as f64,
            })
        }
    }

    fn folds(n: usize) -> Vec<FoldDataset<()>> {
        (0..n)
            .map(|fold| FoldDataset {
                fold,
                train: (),
                valid: (),
                train_rows: 10,
                valid_rows: 5,
            })
            .collect()
    }

    #[tokio::test]
    async fn one_score_per_fold_in_order() {
        let backend = FoldIndexBackend { fail_on: None };
        let scores = cross_validate(
            &backend,
            &ParamSet::new(),
            &folds(3),
            3,
            &TrainingBudget::default(),
        )
        .await
        .unwrap();
        assert_eq!(scores.iter().map(|s| s.rounds).collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn summary_aggregates_folds() {
        let backend = FoldIndexBackend { fail_on: None };
        let summary = evaluate(&backend, &ParamSet::new(), &folds(2), &TrainingBudget::default())
            .await
            .unwrap();
        assert_eq!(summary.rounds_mean, 15.0);
        assert!((summary.valid_auc_mean - 0.65).abs() < 1e-12);
        assert_eq!(summary.train_auc_std, 0.0);
    }

    #[tokio::test]
    async fn fold_count_mismatch() {
        let backend = FoldIndexBackend { fail_on: None };
        let err = cross_validate(
            &backend,
            &ParamSet::new(),
            &folds(2),
            3,
            &TrainingBudget::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            BsError::Search(SearchError::FoldCountMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn fold_failure_aborts_the_setting() {
        let backend = FoldIndexBackend { fail_on: Some(1) };
        let err = cross_validate(
            &backend,
            &ParamSet::new(),
            &folds(3),
            3,
            &TrainingBudget::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BsError::Backend(BackendError::ToolFailed { .. })));
    }
}
