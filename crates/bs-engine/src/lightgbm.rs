//! LightGBM backend driven through the `lightgbm` command-line tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use bs_types::{BackendKind, BsResult, FoldScore, Frame, ParamSet, ParamValue, SearchError};

use crate::backend::{Backend, FoldDataset, TrainingBudget};
use crate::container::{fold_dir, write_delimited, DelimitedFormat};
use crate::history::EvalHistory;
use crate::process::ToolCommand;

const TOOL: &str = "lightgbm";

/// Keys the backend sets itself; values for them in a parameter setting
/// are ignored, since the CLI keeps the first occurrence of a key.
const RESERVED_KEYS: &[&str] = &[
    "task",
    "data",
    "valid_data",
    "header",
    "label_column",
    "categorical_feature",
    "output_model",
    "metric",
    "metric_freq",
    "is_provide_training_metric",
    "num_iterations",
    "early_stopping_round",
    "verbosity",
];

/// A LightGBM data file.
#[derive(Debug, Clone)]
pub struct LightGbmFile {
    pub path: PathBuf,
    pub categorical: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LightGbmBackend {
    tool: ToolCommand,
    work_dir: PathBuf,
}

impl LightGbmBackend {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: ToolCommand::new(TOOL, program),
            work_dir: work_dir.into(),
        }
    }

    fn train_args(
        params: &ParamSet,
        dataset: &FoldDataset<LightGbmFile>,
        budget: &TrainingBudget,
        model_path: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "task=train".to_string(),
            format!("data={}", dataset.train.path.display()),
            format!("valid_data={}", dataset.valid.path.display()),
            "header=true".to_string(),
            "label_column=0".to_string(),
            format!("output_model={}", model_path.display()),
            "metric=auc".to_string(),
            "metric_freq=1".to_string(),
            "is_provide_training_metric=true".to_string(),
            format!("num_iterations={}", budget.max_rounds),
            format!("early_stopping_round={}", budget.early_stopping_rounds),
            "verbosity=1".to_string(),
        ];
        if !dataset.train.categorical.is_empty() {
            args.push(format!(
                "categorical_feature=name:{}",
                dataset.train.categorical.join(",")
            ));
        }
        args.extend(
            params
                .iter()
                .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
                .map(|(k, v)| format!("{k}={v}")),
        );
        args
    }
}

#[async_trait]
impl Backend for LightGbmBackend {
    type Container = LightGbmFile;

    fn kind(&self) -> BackendKind {
        BackendKind::LightGbm
    }

    fn build_dataset(
        &self,
        fold: usize,
        train: &Frame,
        valid: &Frame,
    ) -> BsResult<FoldDataset<LightGbmFile>> {
        train.resolve_columns(train.categorical())?;
        let dir = fold_dir(&self.work_dir, fold)?;

        let train_path = dir.join("train.csv");
        let valid_path = dir.join("valid.csv");
        write_delimited(&train_path, train, DelimitedFormat::CSV)?;
        write_delimited(&valid_path, valid, DelimitedFormat::CSV)?;

        let categorical = train.categorical().to_vec();
        Ok(FoldDataset {
            fold,
            train: LightGbmFile {
                path: train_path,
                categorical: categorical.clone(),
            },
            valid: LightGbmFile {
                path: valid_path,
                categorical,
            },
            train_rows: train.n_rows(),
            valid_rows: valid.n_rows(),
        })
    }

    /// Bound tree depth by the leaf budget: `max_depth = ceil(log2(num_leaves))`.
    fn derive_params(&self, params: &mut ParamSet) -> BsResult<()> {
        let Some(value) = params.get("num_leaves") else {
            return Ok(());
        };
        let num_leaves = value
            .as_i64()
            .filter(|n| *n >= 1)
            .ok_or_else(|| SearchError::InvalidParameter {
                parameter: "num_leaves".to_string(),
                message: format!("expected a positive integer, got {value}"),
            })?;
        params.insert("max_depth", ParamValue::Int(depth_for_leaves(num_leaves as u64)));
        Ok(())
    }

    async fn train_and_score(
        &self,
        params: &ParamSet,
        dataset: &FoldDataset<LightGbmFile>,
        budget: &TrainingBudget,
    ) -> BsResult<FoldScore> {
        let dir = fold_dir(&self.work_dir, dataset.fold)?;
        let model_path = dir.join("model.txt");
        let args = Self::train_args(params, dataset, budget, &model_path);

        let output = self.tool.run(&args, &dir).await?;
        let history = parse_history(&output.combined())?;
        debug!(
            "lightgbm fold {} reported {} rounds",
            dataset.fold,
            history.len()
        );
        history.best_score(TOOL, budget.early_stopping_rounds, budget.max_rounds)
    }
}

/// `ceil(log2(n))` for `n >= 1`.
pub fn depth_for_leaves(n: u64) -> i64 {
    if n <= 1 {
        return 0;
    }
    (u64::BITS - (n - 1).leading_zeros()) as i64
}

fn metric_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Iteration:(\d+), (training|valid_\d+) auc : (\S+)")
            .expect("lightgbm metric pattern is valid")
    })
}

/// Parse per-iteration `training` and `valid_1` AUC from the tool's log.
pub fn parse_history(log: &str) -> BsResult<EvalHistory> {
    let mut train = BTreeMap::new();
    let mut valid = BTreeMap::new();

    for caps in metric_line().captures_iter(log) {
        let (Ok(round), Ok(auc)) = (caps[1].parse::<usize>(), caps[3].parse::<f64>()) else {
            continue;
        };
        if &caps[2] == "training" {
            train.insert(round, auc);
        } else {
            valid.entry(round).or_insert(auc);
        }
    }

    EvalHistory::from_partial(TOOL, train, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bs_types::BsError;

    const LOG: &str = "\
[LightGBM] [Info] Total Bins 1234
[LightGBM] [Info] Iteration:1, training auc : 0.71
[LightGBM] [Info] Iteration:1, valid_1 auc : 0.65
[LightGBM] [Info] 0.002 seconds elapsed, finished iteration 1
[LightGBM] [Info] Iteration:2, training auc : 0.75
[LightGBM] [Info] Iteration:2, valid_1 auc : 0.69
[LightGBM] [Info] Iteration:3, training auc : 0.79
[LightGBM] [Info] Iteration:3, valid_1 auc : 0.68
[LightGBM] [Info] Early stopping at iteration 3, the best iteration round is 2
";

    #[test]
    fn derived_depth_matches_leaf_budget() {
        assert_eq!(depth_for_leaves(512), 9);
        assert_eq!(depth_for_leaves(8192), 13);
        assert_eq!(depth_for_leaves(31), 5);
        assert_eq!(depth_for_leaves(2), 1);
        assert_eq!(depth_for_leaves(1), 0);
    }

    #[test]
    fn derive_params_sets_max_depth() {
        let backend = LightGbmBackend::new("lightgbm", "/tmp");
        let mut params = ParamSet::new().with("num_leaves", 512i64).with("max_depth", -1i64);
        backend.derive_params(&mut params).unwrap();
        assert_eq!(params.get("max_depth"), Some(&ParamValue::Int(9)));

        let mut params = ParamSet::new().with("num_leaves", 8192.0);
        backend.derive_params(&mut params).unwrap();
        assert_eq!(params.get("max_depth"), Some(&ParamValue::Int(13)));
    }

    #[test]
    fn derive_params_rejects_bad_leaf_count() {
        let backend = LightGbmBackend::new("lightgbm", "/tmp");
        let mut params = ParamSet::new().with("num_leaves", 0i64);
        let err = backend.derive_params(&mut params).unwrap_err();
        assert!(matches!(
            err,
            BsError::Search(SearchError::InvalidParameter { .. })
        ));

        let mut untouched = ParamSet::new().with("learning_rate", 0.1);
        backend.derive_params(&mut untouched).unwrap();
        assert!(!untouched.contains("max_depth"));
    }

    #[test]
    fn parses_training_log_and_picks_best_round() {
        let history = parse_history(LOG).unwrap();
        assert_eq!(history.len(), 3);
        let score = history.best_score(TOOL, 25, 250).unwrap();
        assert_eq!(score.rounds, 2);
        assert_eq!(score.train_auc, 0.75);
        assert_eq!(score.valid_auc, 0.69);
    }

    #[test]
    fn log_without_metrics_is_an_error() {
        assert!(parse_history("[LightGBM] [Fatal] something broke").is_err());
    }

    #[test]
    fn builds_headered_fold_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LightGbmBackend::new("lightgbm", dir.path());
        let frame = Frame::new(
            vec!["x".into(), "store".into()],
            vec![0.5, 1.0, 0.7, 2.0, 0.1, 1.0],
            vec![1.0, 0.0, 1.0],
        )
        .unwrap()
        .with_categorical(vec!["store".into()]);

        let ds = backend
            .build_dataset(0, &frame.slice(0..2).unwrap(), &frame.slice(2..3).unwrap())
            .unwrap();
        assert_eq!(ds.train.path.parent(), ds.valid.path.parent());
        assert_eq!(ds.train.categorical, vec!["store".to_string()]);
        let text = std::fs::read_to_string(&ds.valid.path).unwrap();
        assert_eq!(text, "label,x,store\n1,0.1,1\n");

        let args = LightGbmBackend::train_args(
            &ParamSet::new().with("learning_rate", 0.05).with("metric", "binary_logloss"),
            &ds,
            &TrainingBudget::default(),
            Path::new("model.txt"),
        );
        assert!(args.contains(&"categorical_feature=name:store".to_string()));
        assert!(args.contains(&"learning_rate=0.05".to_string()));
        assert!(args.contains(&"num_iterations=250".to_string()));
        assert!(!args.iter().any(|a| a == "metric=binary_logloss"));
    }

    #[test]
    fn unknown_categorical_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LightGbmBackend::new("lightgbm", dir.path());
        let frame = Frame::new(vec!["x".into()], vec![0.5, 0.7], vec![1.0, 0.0])
            .unwrap()
            .with_categorical(vec!["store".into()]);
        assert!(backend.build_dataset(0, &frame, &frame).is_err());
    }
}
