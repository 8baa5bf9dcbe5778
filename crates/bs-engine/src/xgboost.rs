//! XGBoost backend driven through the `xgboost` command-line tool.
//!
//! The CLI trains for a fixed number of rounds and prints one evaluation
//! line per round; early stopping is applied to the parsed history.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use bs_types::{BackendKind, BsResult, FoldScore, Frame, ParamSet};

use crate::backend::{Backend, FoldDataset, TrainingBudget};
use crate::container::{fold_dir, write_delimited, DelimitedFormat};
use crate::history::EvalHistory;
use crate::process::ToolCommand;

const TOOL: &str = "xgboost";

const RESERVED_KEYS: &[&str] = &[
    "task",
    "data",
    "num_round",
    "model_out",
    "eval_metric",
    "eval_train",
    "save_period",
];

/// A headerless CSV matrix with the label in column 0.
#[derive(Debug, Clone)]
pub struct XgbMatrix {
    pub path: PathBuf,
}

impl XgbMatrix {
    /// URI understood by XGBoost's text loader.
    pub fn uri(&self) -> String {
        format!("{}?format=csv&label_column=0", self.path.display())
    }
}

#[derive(Debug, Clone)]
pub struct XgBoostBackend {
    tool: ToolCommand,
    work_dir: PathBuf,
}

impl XgBoostBackend {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: ToolCommand::new(TOOL, program),
            work_dir: work_dir.into(),
        }
    }

    fn render_config(
        params: &ParamSet,
        dataset: &FoldDataset<XgbMatrix>,
        budget: &TrainingBudget,
        model_path: &Path,
    ) -> String {
        let mut conf = String::new();
        for (name, value) in params.iter() {
            if RESERVED_KEYS.contains(&name.as_str()) || name.starts_with("eval[") {
                continue;
            }
            let _ = writeln!(conf, "{name} = {value}");
        }
        let _ = writeln!(conf, "task = train");
        let _ = writeln!(conf, "data = \"{}\"", dataset.train.uri());
        let _ = writeln!(conf, "eval[train] = \"{}\"", dataset.train.uri());
        let _ = writeln!(conf, "eval[valid] = \"{}\"", dataset.valid.uri());
        let _ = writeln!(conf, "eval_metric = auc");
        let _ = writeln!(conf, "num_round = {}", budget.max_rounds);
        let _ = writeln!(conf, "save_period = 0");
        let _ = writeln!(conf, "model_out = \"{}\"", model_path.display());
        conf
    }
}

#[async_trait]
impl Backend for XgBoostBackend {
    type Container = XgbMatrix;

    fn kind(&self) -> BackendKind {
        BackendKind::XgBoost
    }

    /// Categorical columns are written as their integer codes; the CLI has
    /// no native categorical input.
    fn build_dataset(
        &self,
        fold: usize,
        train: &Frame,
        valid: &Frame,
    ) -> BsResult<FoldDataset<XgbMatrix>> {
        train.resolve_columns(train.categorical())?;
        let dir = fold_dir(&self.work_dir, fold)?;

        let train_path = dir.join("train.csv");
        let valid_path = dir.join("valid.csv");
        write_delimited(&train_path, train, DelimitedFormat::CSV_NO_HEADER)?;
        write_delimited(&valid_path, valid, DelimitedFormat::CSV_NO_HEADER)?;

        Ok(FoldDataset {
            fold,
            train: XgbMatrix { path: train_path },
            valid: XgbMatrix { path: valid_path },
            train_rows: train.n_rows(),
            valid_rows: valid.n_rows(),
        })
    }

    async fn train_and_score(
        &self,
        params: &ParamSet,
        dataset: &FoldDataset<XgbMatrix>,
        budget: &TrainingBudget,
    ) -> BsResult<FoldScore> {
        let dir = fold_dir(&self.work_dir, dataset.fold)?;
        let conf_path = dir.join("train.conf");
        let model_path = dir.join("model.json");
        fs::write(
            &conf_path,
            Self::render_config(params, dataset, budget, &model_path),
        )?;

        let output = self.tool.run([&conf_path], &dir).await?;
        let history = parse_history(&output.combined())?;
        debug!(
            "xgboost fold {} reported {} rounds",
            dataset.fold,
            history.len()
        );
        history.best_score(TOOL, budget.early_stopping_rounds, budget.max_rounds)
    }
}

fn metric_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(\d+)\]\s+train-auc:(\S+)\s+valid-auc:(\S+)")
            .expect("xgboost metric pattern is valid")
    })
}

/// Parse `[N]\ttrain-auc:x\tvalid-auc:y` lines. XGBoost counts rounds
/// from zero.
pub fn parse_history(log: &str) -> BsResult<EvalHistory> {
    let mut train = BTreeMap::new();
    let mut valid = BTreeMap::new();

    for caps in metric_line().captures_iter(log) {
        let (Ok(round), Ok(t), Ok(v)) = (
            caps[1].parse::<usize>(),
            caps[2].parse::<f64>(),
            caps[3].parse::<f64>(),
        ) else {
            continue;
        };
        train.insert(round + 1, t);
        valid.insert(round + 1, v);
    }

    EvalHistory::from_partial(TOOL, train, valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
[10:21:03] 800x3 matrix with 2400 entries loaded from train.csv?format=csv&label_column=0
[0]\ttrain-auc:0.700000\tvalid-auc:0.610000
[1]\ttrain-auc:0.740000\tvalid-auc:0.660000
[2]\ttrain-auc:0.780000\tvalid-auc:0.650000
[3]\ttrain-auc:0.810000\tvalid-auc:0.640000
";

    #[test]
    fn parses_zero_based_rounds() {
        let history = parse_history(LOG).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.rounds()[0].round, 1);

        let score = history.best_score(TOOL, 2, 250).unwrap();
        assert_eq!(score.rounds, 2);
        assert_eq!(score.train_auc, 0.74);
        assert_eq!(score.valid_auc, 0.66);
    }

    #[test]
    fn missing_eval_lines_is_an_error() {
        assert!(parse_history("[10:21:03] loaded").is_err());
    }

    #[test]
    fn config_points_at_headerless_matrices() {
        let dir = tempfile::tempdir().unwrap();
        let backend = XgBoostBackend::new("xgboost", dir.path());
        let frame = Frame::new(
            vec!["x".into(), "store".into()],
            vec![0.5, 1.0, 0.7, 2.0],
            vec![1.0, 0.0],
        )
        .unwrap()
        .with_categorical(vec!["store".into()]);

        let ds = backend.build_dataset(1, &frame, &frame).unwrap();
        assert_eq!(
            std::fs::read_to_string(&ds.train.path).unwrap(),
            "1,0.5,1\n0,0.7,2\n"
        );
        assert!(ds.train.uri().ends_with("train.csv?format=csv&label_column=0"));

        let params = ParamSet::new()
            .with("eta", 0.1)
            .with("max_depth", 6i64)
            .with("num_round", 10i64);
        let conf = XgBoostBackend::render_config(
            &params,
            &ds,
            &TrainingBudget::default(),
            Path::new("model.json"),
        );
        assert!(conf.starts_with("eta = 0.1\nmax_depth = 6\n"));
        assert!(conf.contains("num_round = 250\n"));
        assert!(!conf.contains("num_round = 10\n"));
        assert!(conf.contains("eval[valid] = \""));
        assert!(conf.contains("eval_metric = auc\n"));
    }
}
