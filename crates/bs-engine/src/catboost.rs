//! CatBoost backend driven through the `catboost` command-line tool.
//!
//! `catboost fit` only reports the best iteration, so train and validation
//! AUC are computed from `catboost calc` probabilities with [`roc_auc`].

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use bs_types::{BackendError, BackendKind, BsResult, FoldScore, Frame, ParamSet};

use crate::backend::{Backend, FoldDataset, TrainingBudget};
use crate::container::{fold_dir, write_delimited, DelimitedFormat};
use crate::metrics::roc_auc;
use crate::process::ToolCommand;

const TOOL: &str = "catboost";

/// A TSV pool with its column description and labels kept for scoring.
#[derive(Debug, Clone)]
pub struct CatBoostPool {
    pub path: PathBuf,
    pub cd_path: PathBuf,
    pub labels: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CatBoostBackend {
    tool: ToolCommand,
    work_dir: PathBuf,
}

impl CatBoostBackend {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: ToolCommand::new(TOOL, program),
            work_dir: work_dir.into(),
        }
    }

    fn params_json(params: &ParamSet, budget: &TrainingBudget) -> serde_json::Value {
        let mut json = params.to_json();
        if let Some(map) = json.as_object_mut() {
            map.insert("iterations".into(), budget.max_rounds.into());
            map.insert("od_type".into(), "Iter".into());
            map.insert("od_wait".into(), budget.early_stopping_rounds.into());
            map.insert("eval_metric".into(), "AUC".into());
            map.insert("use_best_model".into(), true.into());
            // the best-iteration summary is only printed at this level
            map.insert("logging_level".into(), "Verbose".into());
        }
        json
    }

    async fn predict(
        &self,
        model_path: &Path,
        pool: &CatBoostPool,
        dir: &Path,
        name: &str,
    ) -> BsResult<Vec<f64>> {
        let output_path = dir.join(format!("{name}_pred.tsv"));
        let args: Vec<&OsStr> = vec![
            OsStr::new("calc"),
            OsStr::new("--model-file"),
            model_path.as_os_str(),
            OsStr::new("--input-path"),
            pool.path.as_os_str(),
            OsStr::new("--column-description"),
            pool.cd_path.as_os_str(),
            OsStr::new("--has-header"),
            OsStr::new("--prediction-type"),
            OsStr::new("Probability"),
            OsStr::new("--output-path"),
            output_path.as_os_str(),
        ];
        self.tool.run(args, dir).await?;

        let probabilities = parse_probabilities(&fs::read_to_string(&output_path)?)?;
        if probabilities.len() != pool.labels.len() {
            return Err(BackendError::OutputParse {
                tool: TOOL.to_string(),
                message: format!(
                    "{} predictions for {} rows in {}",
                    probabilities.len(),
                    pool.labels.len(),
                    pool.path.display()
                ),
            }
            .into());
        }
        Ok(probabilities)
    }
}

#[async_trait]
impl Backend for CatBoostBackend {
    type Container = CatBoostPool;

    fn kind(&self) -> BackendKind {
        BackendKind::CatBoost
    }

    fn build_dataset(
        &self,
        fold: usize,
        train: &Frame,
        valid: &Frame,
    ) -> BsResult<FoldDataset<CatBoostPool>> {
        let positions = train.resolve_columns(train.categorical())?;
        let dir = fold_dir(&self.work_dir, fold)?;

        let cd_path = dir.join("pool.cd");
        fs::write(&cd_path, column_description(train.columns(), &positions))?;

        let train_path = dir.join("train.tsv");
        let valid_path = dir.join("valid.tsv");
        write_delimited(&train_path, train, DelimitedFormat::TSV)?;
        write_delimited(&valid_path, valid, DelimitedFormat::TSV)?;

        Ok(FoldDataset {
            fold,
            train: CatBoostPool {
                path: train_path,
                cd_path: cd_path.clone(),
                labels: train.target().to_vec(),
            },
            valid: CatBoostPool {
                path: valid_path,
                cd_path,
                labels: valid.target().to_vec(),
            },
            train_rows: train.n_rows(),
            valid_rows: valid.n_rows(),
        })
    }

    async fn train_and_score(
        &self,
        params: &ParamSet,
        dataset: &FoldDataset<CatBoostPool>,
        budget: &TrainingBudget,
    ) -> BsResult<FoldScore> {
        let dir = fold_dir(&self.work_dir, dataset.fold)?;
        let params_path = dir.join("params.json");
        let model_path = dir.join("model.cbm");
        fs::write(
            &params_path,
            serde_json::to_vec_pretty(&Self::params_json(params, budget))?,
        )?;

        let train_dir = dir.join("catboost_info");
        let args: Vec<&OsStr> = vec![
            OsStr::new("fit"),
            OsStr::new("--learn-set"),
            dataset.train.path.as_os_str(),
            OsStr::new("--test-set"),
            dataset.valid.path.as_os_str(),
            OsStr::new("--column-description"),
            dataset.train.cd_path.as_os_str(),
            OsStr::new("--has-header"),
            OsStr::new("--params-file"),
            params_path.as_os_str(),
            OsStr::new("--train-dir"),
            train_dir.as_os_str(),
            OsStr::new("--model-file"),
            model_path.as_os_str(),
        ];
        let output = self.tool.run(args, &dir).await?;

        let rounds = parse_best_iteration(&output.combined())? + 1;
        debug!("catboost fold {} best round {}", dataset.fold, rounds);

        let train_pred = self.predict(&model_path, &dataset.train, &dir, "train").await?;
        let valid_pred = self.predict(&model_path, &dataset.valid, &dir, "valid").await?;

        Ok(FoldScore {
            rounds,
            train_auc: roc_auc(&dataset.train.labels, &train_pred)?,
            valid_auc: roc_auc(&dataset.valid.labels, &valid_pred)?,
        })
    }
}

/// Column description: label at 0, features after it, categorical
/// features (by resolved position) marked `Categ`.
pub fn column_description(columns: &[String], categorical: &[usize]) -> String {
    let mut cd = String::from("0\tLabel\n");
    for (idx, name) in columns.iter().enumerate() {
        let kind = if categorical.contains(&idx) { "Categ" } else { "Num" };
        let _ = writeln!(cd, "{}\t{}\t{}", idx + 1, kind, name);
    }
    cd
}

fn best_iteration_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"bestIteration = (\d+)").expect("catboost best iteration pattern is valid")
    })
}

/// Zero-based best iteration reported by `catboost fit`.
pub fn parse_best_iteration(log: &str) -> BsResult<usize> {
    best_iteration_line()
        .captures_iter(log)
        .last()
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| {
            BackendError::MissingMetric {
                tool: TOOL.to_string(),
                metric: "bestIteration".to_string(),
            }
            .into()
        })
}

/// Positive-class probabilities from a `catboost calc` output file; the
/// last column holds them.
pub fn parse_probabilities(text: &str) -> BsResult<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut probabilities = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = record.iter().last().unwrap_or_default();
        let value = field.parse::<f64>().map_err(|e| BackendError::OutputParse {
            tool: TOOL.to_string(),
            message: format!("bad probability {field:?}: {e}"),
        })?;
        probabilities.push(value);
    }
    Ok(probabilities)
}
