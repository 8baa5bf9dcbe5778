use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::errors::{BsResult, DataError};

/// An in-memory feature/target table.
///
/// Features are stored row-major as `f64`; `NaN` marks a missing value.
/// Categorical columns hold integer codes and are listed by name in
/// `categorical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    values: Vec<f64>,
    target: Vec<f64>,
    categorical: Vec<String>,
}

impl Frame {
    pub fn new(columns: Vec<String>, values: Vec<f64>, target: Vec<f64>) -> BsResult<Self> {
        if values.len() != columns.len() * target.len() {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "{} values do not fill {} rows x {} columns",
                    values.len(),
                    target.len(),
                    columns.len()
                ),
            }
            .into());
        }

        Ok(Self {
            columns,
            values,
            target,
            categorical: Vec::new(),
        })
    }

    /// Declare categorical columns. Names are checked lazily, when a
    /// backend resolves them.
    pub fn with_categorical(mut self, categorical: Vec<String>) -> Self {
        self.categorical = categorical;
        self
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.values[index * n_cols..(index + 1) * n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[f64], f64)> + '_ {
        (0..self.n_rows()).map(move |i| (self.row(i), self.target[i]))
    }

    pub fn column_index(&self, name: &str) -> BsResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                DataError::ColumnNotFound {
                    column: name.to_string(),
                }
                .into()
            })
    }

    /// Resolve column names to ordinal feature positions.
    pub fn resolve_columns<S: AsRef<str>>(&self, names: &[S]) -> BsResult<Vec<usize>> {
        names
            .iter()
            .map(|name| self.column_index(name.as_ref()))
            .collect()
    }

    pub fn column(&self, name: &str) -> BsResult<Vec<f64>> {
        let idx = self.column_index(name)?;
        Ok((0..self.n_rows()).map(|r| self.row(r)[idx]).collect())
    }

    /// Materialize the rows at `indices`, in the given order.
    pub fn take(&self, indices: &[usize]) -> BsResult<Frame> {
        let n_cols = self.n_cols();
        let mut values = Vec::with_capacity(indices.len() * n_cols);
        let mut target = Vec::with_capacity(indices.len());

        for &index in indices {
            if index >= self.n_rows() {
                return Err(DataError::IndexOutOfRange {
                    index,
                    rows: self.n_rows(),
                }
                .into());
            }
            values.extend_from_slice(self.row(index));
            target.push(self.target[index]);
        }

        Ok(Frame {
            columns: self.columns.clone(),
            values,
            target,
            categorical: self.categorical.clone(),
        })
    }

    /// Contiguous row range; used for time-ordered partitions.
    pub fn slice(&self, range: Range<usize>) -> BsResult<Frame> {
        if range.end > self.n_rows() || range.start > range.end {
            return Err(DataError::IndexOutOfRange {
                index: range.end,
                rows: self.n_rows(),
            }
            .into());
        }
        let indices: Vec<usize> = range.collect();
        self.take(&indices)
    }
}
