//! The search loop: evaluate every grid point, record, checkpoint.

use std::time::Instant;

use tracing::{error, info};

use bs_data::{frame_to_record_batch, split_holdout, FrameLoader, ResultStore, StoreKey};
use bs_engine::{build_fold_datasets, Backend, FoldDataset, TrainingBudget};
use bs_types::{BsResult, CvSummary, Encoding, Frame, ParamSet, SearchError};

use crate::config::SweepConfig;
use crate::progress::ProgressReport;
use crate::results::{ResultRow, ResultsTable};
use crate::runner::cross_validate;
use crate::search::ParameterGrid;
use crate::status::SweepStatus;

pub const TRAIN_TAG: &str = "train";
pub const HOLDOUT_TAG: &str = "holdout";

/// Fixed inputs of one sweep.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub name: String,
    pub encoding: Encoding,
    /// Where the results table is checkpointed.
    pub key: StoreKey,
    /// Non-swept parameters shared by every grid point.
    pub baseline: ParamSet,
    pub budget: TrainingBudget,
    pub n_folds: usize,
    pub leaderboard_size: usize,
}

impl SweepSettings {
    pub fn new(
        name: impl Into<String>,
        encoding: Encoding,
        key: StoreKey,
        n_folds: usize,
    ) -> Self {
        Self {
            name: name.into(),
            encoding,
            key,
            baseline: ParamSet::new(),
            budget: TrainingBudget::default(),
            n_folds,
            leaderboard_size: 5,
        }
    }

    pub fn with_baseline(mut self, baseline: ParamSet) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_budget(mut self, budget: TrainingBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_leaderboard_size(mut self, n: usize) -> Self {
        self.leaderboard_size = n;
        self
    }
}

/// Final state of a sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub results: ResultsTable,
    pub status: SweepStatus,
}

/// Evaluate every grid point in order against pre-built folds.
///
/// The full results table is written to the store after each iteration,
/// replacing the previous snapshot. The first failure ends the sweep;
/// rows completed before it stay in the last snapshot.
pub async fn run_sweep<B: Backend>(
    backend: &B,
    folds: &[FoldDataset<B::Container>],
    grid: ParameterGrid,
    settings: &SweepSettings,
    store: &ResultStore,
) -> BsResult<SweepOutcome> {
    if grid.is_empty() {
        return Err(SearchError::EmptyGrid.into());
    }

    let total = grid.len();
    let mut status = SweepStatus::new(
        settings.name.clone(),
        backend.kind(),
        settings.encoding,
        total,
    );
    let mut results = ResultsTable::new();

    info!(
        "Starting sweep {} ({}): {} grid points, {} folds, checkpointing to {}",
        settings.name,
        backend.kind(),
        total,
        folds.len(),
        settings.key
    );
    status.mark_running();
    let sweep_started = Instant::now();

    for (iteration, point) in grid.into_iter().enumerate() {
        let started = Instant::now();
        let (params, summary) = match evaluate_point(backend, folds, &point, settings).await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                error!("Sweep {} failed at iteration {}: {}", settings.name, iteration, e);
                status.mark_failed(e.to_string());
                return Err(e);
            }
        };
        let elapsed = started.elapsed();

        let row = ResultRow {
            iteration,
            summary,
            params,
            elapsed_secs: elapsed.as_secs_f64(),
        };
        status.record(&row);
        results.push(row);

        if leaderboard_due(results.len()) {
            info!(
                "Top {} by valid_auc_mean:\n{}",
                settings.leaderboard_size,
                results.leaderboard(settings.leaderboard_size)
            );
        }
        info!(
            "{}",
            ProgressReport::new(iteration + 1, total, elapsed, sweep_started.elapsed())
        );

        if let Err(e) = results
            .to_record_batch()
            .and_then(|batch| store.write_table(&settings.key, &batch))
        {
            status.mark_failed(e.to_string());
            return Err(e);
        }
    }

    status.mark_completed();
    if let Some(best) = &status.best {
        info!(
            "Sweep {} completed: {} iterations, best valid_auc_mean {:.5} at iteration {}",
            settings.name, status.completed, best.summary.valid_auc_mean, best.iteration
        );
    }

    Ok(SweepOutcome { results, status })
}

/// The leaderboard is shown once there is more than one row to rank.
fn leaderboard_due(rows: usize) -> bool {
    rows > 1
}

/// Merge, derive, cross-validate and aggregate one grid point.
async fn evaluate_point<B: Backend>(
    backend: &B,
    folds: &[FoldDataset<B::Container>],
    point: &ParamSet,
    settings: &SweepSettings,
) -> BsResult<(ParamSet, CvSummary)> {
    let mut params = settings.baseline.merged(point);
    backend.derive_params(&mut params)?;
    let scores =
        cross_validate(backend, &params, folds, settings.n_folds, &settings.budget).await?;
    Ok((params, CvSummary::from_scores(&scores)))
}

/// Persist the cross-validation and holdout partitions next to the
/// results, under the `train` and `holdout` tags.
pub fn persist_partitions(
    store: &ResultStore,
    key: &StoreKey,
    train: &Frame,
    holdout: &Frame,
    target: &str,
) -> BsResult<()> {
    store.write_table(&key.with_tag(TRAIN_TAG), &frame_to_record_batch(train, target)?)?;
    store.write_table(&key.with_tag(HOLDOUT_TAG), &frame_to_record_batch(holdout, target)?)?;
    info!(
        "Persisted {} training and {} holdout rows under {}/{}",
        train.n_rows(),
        holdout.n_rows(),
        key.backend,
        key.encoding
    );
    Ok(())
}

/// Full run for a configuration: load, hold out, persist partitions,
/// split into folds, build fold containers, then sweep the shuffled grid.
pub async fn run_config<B: Backend>(config: &SweepConfig, backend: &B) -> BsResult<SweepOutcome> {
    config.validate()?;

    let frame = FrameLoader::new(config.load_options()).load(&config.data.path)?;

    let (train, holdout) = split_holdout(&frame, config.data.holdout_fraction)?;
    let store = ResultStore::new(config.store_root())?;
    let key = StoreKey::new(
        backend.kind().as_str(),
        config.encoding.as_str(),
        config.result_tag.clone(),
    );
    persist_partitions(&store, &key, &train, &holdout, &config.data.target)?;

    let splits = config.splitter().split(train.n_rows())?;
    let folds = build_fold_datasets(backend, &train, &splits)?;

    let grid = ParameterGrid::shuffled(&config.search_space, config.seed, config.max_trials);
    let settings = SweepSettings::new(config.name.clone(), config.encoding, key, splits.len())
        .with_baseline(config.baseline())
        .with_budget(config.cv.budget)
        .with_leaderboard_size(config.leaderboard_size);

    run_sweep(backend, &folds, grid, &settings, &store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bs_types::{BackendKind, BsError, FoldScore, ParamValue};
    use std::sync::Mutex;

    /// Records the merged settings it was asked to train.
    #[derive(Default)]
    struct RecordingBackend {
        seen: Mutex<Vec<ParamSet>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        type Container = ();

        fn kind(&self) -> BackendKind {
            BackendKind::LightGbm
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

        fn derive_params(&self, params: &mut ParamSet) -> BsResult<()> {
            if let Some(leaves) = params.get("num_leaves").and_then(ParamValue::as_i64) {
                params.insert("max_depth", leaves / 2);
            }
            Ok(())
        }

        async fn train_and_score(
            &self,
            params: &ParamSet,
            _dataset: &FoldDataset<()>,
            _budget: &TrainingBudget,
        ) -> BsResult<FoldScore> {
            let calls = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(params.clone());
                seen.len()
            };
            if self.fail_after.is_some_and(|n| calls > n) {
                return Err(bs_types::internal_error!("training crashed"));
            }
            let leaves = params.get("num_leaves").and_then(ParamValue::as_f64).unwrap_or(0.0);
            Ok(FoldScore {
                rounds: 25,
                train_auc: 0.9,
                valid_auc: 0.5 + leaves / 1000.0,
            })
        }
    }

    fn key() -> StoreKey {
        StoreKey::new("lightgbm", "factorize", "results")
    }

    fn folds(n: usize) -> Vec<FoldDataset<()>> {
        (0..n)
            .map(|fold| FoldDataset {
                fold,
                train: (),
                valid: (),
                train_rows: 8,
                valid_rows: 4,
            })
            .collect()
    }

    fn grid() -> ParameterGrid {
        let space = crate::search::SearchSpace::new()
            .add_choice("num_leaves", vec![ParamValue::Int(31), ParamValue::Int(63)]);
        ParameterGrid::shuffled(&space, Some(3), None)
    }

    #[tokio::test]
    async fn baseline_is_merged_and_derived_per_point() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path()).unwrap();
        let backend = RecordingBackend::default();
        let settings = SweepSettings::new("t", Encoding::Factorize, key(), 2).with_baseline(
            ParamSet::new()
                .with("objective", "binary")
                .with("num_leaves", 7i64),
        );

        let outcome = run_sweep(&backend, &folds(2), grid(), &settings, &store)
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        for params in seen.iter() {
            assert_eq!(
                params.names().collect::<Vec<_>>(),
                vec!["objective", "num_leaves", "max_depth"]
            );
            let leaves = params.get("num_leaves").and_then(ParamValue::as_i64).unwrap();
            assert!(leaves == 31 || leaves == 63);
            assert_eq!(params.get("max_depth").and_then(ParamValue::as_i64), Some(leaves / 2));
        }

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.status.completed, 2);
        let best = outcome.status.best.unwrap();
        assert_eq!(best.params.get("num_leaves"), Some(&ParamValue::Int(63)));
        assert_eq!(store.read_table(&settings.key).unwrap().num_rows(), 2);
    }

    #[tokio::test]
    async fn failure_keeps_last_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path()).unwrap();
        // two folds per point: the third training call is the first fold of point two
        let backend = RecordingBackend {
            fail_after: Some(2),
            ..Default::default()
        };
        let settings = SweepSettings::new("t", Encoding::Factorize, key(), 2);

        let err = run_sweep(&backend, &folds(2), grid(), &settings, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, BsError::Internal(_)));
        assert_eq!(store.read_table(&settings.key).unwrap().num_rows(), 1);
    }

    #[test]
    fn leaderboard_waits_for_a_second_row() {
        assert!(!leaderboard_due(0));
        assert!(!leaderboard_due(1));
        assert!(leaderboard_due(2));
    }

    #[tokio::test]
    async fn empty_grid_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path()).unwrap();
        let space = crate::search::SearchSpace::new().add_choice("num_leaves", vec![]);
        let settings = SweepSettings::new(
            "t",
            Encoding::OneHot,
            StoreKey::new("xgboost", "onehot", "results"),
            2,
        );

        let err = run_sweep(
            &RecordingBackend::default(),
            &folds(2),
            ParameterGrid::new(&space),
            &settings,
            &store,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BsError::Search(SearchError::EmptyGrid)));
    }

    #[tokio::test]
    async fn fold_count_mismatch_fails_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path()).unwrap();
        let settings = SweepSettings::new("t", Encoding::Factorize, key(), 3);

        let err = run_sweep(&RecordingBackend::default(), &folds(2), grid(), &settings, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, BsError::Search(SearchError::FoldCountMismatch { .. })));
        assert!(!store.contains(&settings.key));
    }
}
