//! The growing results table, its leaderboard view and its Arrow form.

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use bs_types::{BsError, BsResult, CvSummary, ParamSet, ParamValue};

pub const ITERATION_COLUMN: &str = "iteration";
pub const ELAPSED_COLUMN: &str = "elapsed_secs";

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub iteration: usize,
    pub summary: CvSummary,
    /// The full merged parameter setting the folds were trained with.
    pub params: ParamSet,
    pub elapsed_secs: f64,
}

/// Results of a sweep, one row per completed iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Parameter names across all rows, in first-seen order.
    pub fn param_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for row in &self.rows {
            for name in row.params.names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Parameter columns whose value differs between at least two rows.
    pub fn varying_param_columns(&self) -> Vec<&str> {
        self.param_columns()
            .into_iter()
            .filter(|name| {
                let mut values = self.rows.iter().map(|r| r.params.get(name));
                match values.next() {
                    Some(first) => values.any(|v| v != first),
                    None => false,
                }
            })
            .collect()
    }

    /// Rows ordered by mean validation AUC, best first.
    pub fn top(&self, n: usize) -> Vec<&ResultRow> {
        let mut ranked: Vec<&ResultRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| ranking_key(b).total_cmp(&ranking_key(a)));
        ranked.truncate(n);
        ranked
    }

    pub fn best(&self) -> Option<&ResultRow> {
        self.top(1).into_iter().next()
    }

    /// Text table of the `n` best rows. Parameter columns that are the
    /// same in every row are left out.
    pub fn leaderboard(&self, n: usize) -> String {
        let params = self.varying_param_columns();
        let mut header = vec![
            ITERATION_COLUMN.to_string(),
            "valid_auc_mean".to_string(),
            "valid_auc_std".to_string(),
            "train_auc_mean".to_string(),
            "rounds_mean".to_string(),
        ];
        header.extend(params.iter().map(|p| p.to_string()));

        let body: Vec<Vec<String>> = self
            .top(n)
            .into_iter()
            .map(|row| {
                let mut cells = vec![
                    row.iteration.to_string(),
                    format!("{:.5}", row.summary.valid_auc_mean),
                    format!("{:.5}", row.summary.valid_auc_std),
                    format!("{:.5}", row.summary.train_auc_mean),
                    format!("{:.1}", row.summary.rounds_mean),
                ];
                cells.extend(params.iter().map(|p| {
                    row.params
                        .get(p)
                        .map(ParamValue::to_string)
                        .unwrap_or_else(|| "-".to_string())
                }));
                cells
            })
            .collect();

        let widths: Vec<usize> = (0..header.len())
            .map(|i| {
                body.iter()
                    .map(|cells| cells[i].len())
                    .chain(std::iter::once(header[i].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        for cells in std::iter::once(&header).chain(body.iter()) {
            let line: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:>w$}"))
                .collect();
            let _ = writeln!(out, "{}", line.join("  ").trim_end());
        }
        out
    }

    /// Arrow form for persistence: iteration, the summary columns,
    /// elapsed time, then one column per parameter. A parameter column is
    /// Float64 when every present value is numeric and Utf8 otherwise.
    pub fn to_record_batch(&self) -> BsResult<RecordBatch> {
        let mut fields = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();

        fields.push(Field::new(ITERATION_COLUMN, DataType::UInt64, false));
        arrays.push(Arc::new(UInt64Array::from(
            self.rows
                .iter()
                .map(|r| r.iteration as u64)
                .collect::<Vec<_>>(),
        )));

        for (idx, name) in CvSummary::COLUMNS.iter().enumerate() {
            fields.push(Field::new(*name, DataType::Float64, false));
            arrays.push(Arc::new(Float64Array::from(
                self.rows
                    .iter()
                    .map(|r| r.summary.values()[idx])
                    .collect::<Vec<_>>(),
            )));
        }

        fields.push(Field::new(ELAPSED_COLUMN, DataType::Float64, false));
        arrays.push(Arc::new(Float64Array::from(
            self.rows.iter().map(|r| r.elapsed_secs).collect::<Vec<_>>(),
        )));

        for name in self.param_columns() {
            let values: Vec<Option<&ParamValue>> =
                self.rows.iter().map(|r| r.params.get(name)).collect();
            let numeric = values.iter().flatten().all(|v| v.as_f64().is_some());

            if numeric {
                fields.push(Field::new(name, DataType::Float64, true));
                arrays.push(Arc::new(Float64Array::from(
                    values
                        .iter()
                        .map(|v| v.and_then(ParamValue::as_f64))
                        .collect::<Vec<_>>(),
                )));
            } else {
                fields.push(Field::new(name, DataType::Utf8, true));
                arrays.push(Arc::new(StringArray::from(
                    values
                        .iter()
                        .map(|v| v.map(ParamValue::to_string))
                        .collect::<Vec<_>>(),
                )));
            }
        }

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| BsError::Arrow(e.to_string()))
    }
}

fn ranking_key(row: &ResultRow) -> f64 {
    let auc = row.summary.valid_auc_mean;
    if auc.is_nan() {
        f64::NEG_INFINITY
    } else {
        auc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use bs_types::FoldScore;

    fn row(iteration: usize, valid: f64, leaves: i64, objective: &str) -> ResultRow {
        let scores = [
            FoldScore {
                rounds: 40,
                train_auc: 0.9,
                valid_auc: valid - 0.01,
            },
            FoldScore {
                rounds: 60,
                train_auc: 0.92,
                valid_auc: valid + 0.01,
            },
        ];
        ResultRow {
            iteration,
            summary: CvSummary::from_scores(&scores),
            params: ParamSet::new()
                .with("objective", objective)
                .with("num_leaves", leaves)
                .with("learning_rate", 0.05),
            elapsed_secs: 1.5,
        }
    }

    fn table() -> ResultsTable {
        let mut table = ResultsTable::new();
        table.push(row(0, 0.70, 31, "binary"));
        table.push(row(1, 0.75, 63, "binary"));
        table.push(row(2, 0.72, 127, "binary"));
        table
    }

    #[test]
    fn top_orders_by_validation_auc() {
        let table = table();
        let top: Vec<usize> = table.top(2).iter().map(|r| r.iteration).collect();
        assert_eq!(top, vec![1, 2]);
        assert_eq!(table.best().unwrap().iteration, 1);
        assert_eq!(table.top(10).len(), 3);
    }

    #[test]
    fn nan_scores_rank_last() {
        let mut table = table();
        let mut bad = row(3, 0.5, 15, "binary");
        bad.summary.valid_auc_mean = f64::NAN;
        table.push(bad);
        assert_eq!(table.top(4).last().unwrap().iteration, 3);
    }

    #[test]
    fn leaderboard_drops_constant_columns() {
        let table = table();
        assert_eq!(table.varying_param_columns(), vec!["num_leaves"]);

        let board = table.leaderboard(5);
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("num_leaves"));
        assert!(!lines[0].contains("objective"));
        assert!(!lines[0].contains("learning_rate"));
        assert!(lines[1].trim_start().starts_with('1'));
        assert!(lines[1].contains("0.75000"));
    }

    #[test]
    fn record_batch_coerces_numeric_params() {
        let batch = table().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        // iteration + 6 summary + elapsed + 3 params
        assert_eq!(batch.num_columns(), 11);

        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), ITERATION_COLUMN);
        assert_eq!(schema.field(5).name(), "valid_auc_mean");
        assert_eq!(schema.field_with_name("objective").unwrap().data_type(), &DataType::Utf8);
        assert_eq!(
            schema.field_with_name("num_leaves").unwrap().data_type(),
            &DataType::Float64
        );

        let leaves = batch
            .column_by_name("num_leaves")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(leaves.value(2), 127.0);
    }

    #[test]
    fn missing_params_become_nulls() {
        let mut table = table();
        let mut extra = row(3, 0.6, 15, "binary");
        extra.params.insert("max_depth", 4i64);
        table.push(extra);

        let batch = table.to_record_batch().unwrap();
        let depth = batch.column_by_name("max_depth").unwrap();
        assert_eq!(depth.null_count(), 3);
        assert!(depth.is_valid(3));
    }

    #[test]
    fn empty_table_has_fixed_columns() {
        let batch = ResultsTable::new().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 8);
    }
}
