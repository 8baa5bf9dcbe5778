use std::collections::HashMap;
use std::fs;
use std::path::Path;

use arrow::array::{Array, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use bs_types::{BsError, BsResult, DataError, Encoding, Frame};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

/// What to read from a raw table and how to encode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Binary target column (values 0/1).
    pub target: String,
    /// Columns holding categorical values.
    #[serde(default)]
    pub categorical: Vec<String>,
    /// Columns removed before encoding (ids, timestamps, leakage).
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub encoding: Encoding,
}

impl LoadOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            categorical: Vec::new(),
            drop: Vec::new(),
            encoding: Encoding::Factorize,
        }
    }

    pub fn with_categorical(mut self, columns: Vec<String>) -> Self {
        self.categorical = columns;
        self
    }

    pub fn with_drop(mut self, columns: Vec<String>) -> Self {
        self.drop = columns;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[derive(Debug, Clone)]
enum RawColumn {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl RawColumn {
    fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Categorical view: numeric columns are keyed by their printed value.
    fn into_keys(self) -> Vec<Option<String>> {
        match self {
            Self::Text(v) => v,
            Self::Numeric(v) => v
                .into_iter()
                .map(|x| if x.is_nan() { None } else { Some(x.to_string()) })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RawTable {
    names: Vec<String>,
    columns: Vec<RawColumn>,
}

impl RawTable {
    fn take_column(&mut self, name: &str) -> BsResult<RawColumn> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::ColumnNotFound {
                column: name.to_string(),
            })?;
        self.names.remove(idx);
        Ok(self.columns.remove(idx))
    }
}

/// Loads feature/target tables from CSV or Parquet and applies the
/// configured categorical encoding.
#[derive(Debug)]
pub struct FrameLoader {
    options: LoadOptions,
}

impl FrameLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a table, dispatching on the file extension.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> BsResult<Frame> {
        let path = path.as_ref();
        tracing::info!("Loading feature table from: {}", path.display());

        if !path.exists() {
            return Err(DataError::LoadingFailed {
                message: format!("{} does not exist", path.display()),
            }
            .into());
        }

        let raw = match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") | Some("pq") => self.read_parquet(path)?,
            Some("csv") | Some("txt") => self.read_csv(path)?,
            other => {
                return Err(DataError::InvalidFormat {
                    message: format!("unsupported table extension: {other:?}"),
                }
                .into())
            }
        };

        let frame = self.encode(raw)?;
        tracing::info!(
            "Loaded {} rows x {} features ({} encoding)",
            frame.n_rows(),
            frame.n_cols(),
            self.options.encoding
        );
        Ok(frame)
    }

    fn read_csv(&self, path: &Path) -> BsResult<RawTable> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let names: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        self.check_columns(&names)?;

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            for (col, value) in record.iter().enumerate() {
                if let Some(cells) = cells.get_mut(col) {
                    cells.push(value.to_string());
                }
            }
        }

        let columns = names
            .iter()
            .zip(cells)
            .map(|(name, values)| {
                if self.options.categorical.contains(name) || self.options.drop.contains(name) {
                    Ok(RawColumn::Text(
                        values
                            .into_iter()
                            .map(|v| if is_missing(&v) { None } else { Some(v) })
                            .collect(),
                    ))
                } else {
                    parse_numeric(name, &values).map(RawColumn::Numeric)
                }
            })
            .collect::<BsResult<Vec<_>>>()?;

        Ok(RawTable { names, columns })
    }

    fn read_parquet(&self, path: &Path) -> BsResult<RawTable> {
        let file = fs::File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to create Parquet reader for {}: {}", path.display(), e),
            })?
            .build()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to build Parquet reader: {}", e),
            })?;

        let mut table = RawTable::default();

        for batch_result in reader {
            let batch = batch_result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read Parquet batch: {}", e),
            })?;
            let schema = batch.schema();

            if table.names.is_empty() {
                for field in schema.fields() {
                    table.names.push(field.name().clone());
                    let as_text = self.options.drop.contains(field.name())
                        || matches!(field.data_type(), DataType::Utf8 | DataType::LargeUtf8);
                    table.columns.push(if as_text {
                        RawColumn::Text(Vec::new())
                    } else {
                        RawColumn::Numeric(Vec::new())
                    });
                }
            }

            for (idx, column) in table.columns.iter_mut().enumerate() {
                let array = batch.column(idx);
                match column {
                    RawColumn::Text(values) => {
                        let utf8 = cast(array, &DataType::Utf8).map_err(|e| {
                            DataError::InvalidFormat {
                                message: format!("column {}: {}", schema.field(idx).name(), e),
                            }
                        })?;
                        let strings = utf8
                            .as_any()
                            .downcast_ref::<StringArray>()
                            .ok_or_else(|| DataError::InvalidFormat {
                                message: format!("column {} is not text", schema.field(idx).name()),
                            })?;
                        for i in 0..strings.len() {
                            values.push(if strings.is_null(i) {
                                None
                            } else {
                                Some(strings.value(i).to_string())
                            });
                        }
                    }
                    RawColumn::Numeric(values) => {
                        let floats = cast(array, &DataType::Float64).map_err(|e| {
                            DataError::InvalidFormat {
                                message: format!("column {}: {}", schema.field(idx).name(), e),
                            }
                        })?;
                        let floats = floats
                            .as_any()
                            .downcast_ref::<Float64Array>()
                            .ok_or_else(|| DataError::InvalidFormat {
                                message: format!(
                                    "column {} is not numeric",
                                    schema.field(idx).name()
                                ),
                            })?;
                        for i in 0..floats.len() {
                            values.push(if floats.is_null(i) { f64::NAN } else { floats.value(i) });
                        }
                    }
                }
            }
        }

        Ok(table)
    }

    /// Every configured column must exist before any value is parsed.
    fn check_columns(&self, names: &[String]) -> BsResult<()> {
        let configured = std::iter::once(&self.options.target)
            .chain(&self.options.categorical)
            .chain(&self.options.drop);
        for column in configured {
            if !names.contains(column) {
                return Err(DataError::ColumnNotFound {
                    column: column.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn encode(&self, mut raw: RawTable) -> BsResult<Frame> {
        self.check_columns(&raw.names)?;
        for name in &self.options.drop {
            raw.take_column(name)?;
        }

        let target = match raw.take_column(&self.options.target)? {
            RawColumn::Numeric(values) => values,
            RawColumn::Text(_) => {
                return Err(DataError::InvalidFormat {
                    message: format!("target column {} is not numeric", self.options.target),
                }
                .into())
            }
        };
        if let Some((row, value)) = target
            .iter()
            .enumerate()
            .find(|(_, v)| **v != 0.0 && **v != 1.0)
        {
            return Err(DataError::InvalidFormat {
                message: format!("target must be binary 0/1, found {value} at row {row}"),
            }
            .into());
        }

        let n_rows = target.len();
        let mut names = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut categorical = Vec::new();
        let mut dummies: Vec<(String, Vec<f64>)> = Vec::new();

        for (name, column) in raw.names.into_iter().zip(raw.columns) {
            if column.len() != n_rows {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "column {} has {} rows, expected {}",
                        name,
                        column.len(),
                        n_rows
                    ),
                }
                .into());
            }

            if !self.options.categorical.contains(&name) {
                match column {
                    RawColumn::Numeric(values) => {
                        names.push(name);
                        columns.push(values);
                    }
                    RawColumn::Text(_) => {
                        return Err(DataError::ParseError {
                            message: format!(
                                "column {name} holds text but is not declared categorical"
                            ),
                        }
                        .into())
                    }
                }
                continue;
            }

            let keys = column.into_keys();
            match self.options.encoding {
                Encoding::Factorize => {
                    names.push(name.clone());
                    columns.push(factorize(&keys));
                    categorical.push(name);
                }
                Encoding::OneHot => dummies.extend(one_hot(&name, &keys)),
            }
        }

        for (name, values) in dummies {
            names.push(name);
            columns.push(values);
        }

        let mut values = Vec::with_capacity(n_rows * names.len());
        for row in 0..n_rows {
            values.extend(columns.iter().map(|c| c[row]));
        }

        Ok(Frame::new(names, values, target)?.with_categorical(categorical))
    }
}

fn is_missing(value: &str) -> bool {
    matches!(value.trim(), "" | "NA" | "NaN" | "nan" | "null" | "None")
}

fn parse_numeric(name: &str, values: &[String]) -> BsResult<Vec<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| -> BsResult<f64> {
            if is_missing(v) {
                return Ok(f64::NAN);
            }
            v.trim().parse::<f64>().map_err(|_| {
                BsError::from(DataError::ParseError {
                    message: format!("column {name}, row {row}: {v:?} is not numeric"),
                })
            })
        })
        .collect()
}

/// Integer codes in order of first appearance; missing values stay NaN.
fn factorize(keys: &[Option<String>]) -> Vec<f64> {
    let mut codes: HashMap<&str, usize> = HashMap::new();
    keys.iter()
        .map(|key| match key {
            Some(k) => {
                let next = codes.len();
                *codes.entry(k.as_str()).or_insert(next) as f64
            }
            None => f64::NAN,
        })
        .collect()
}

/// One indicator column per distinct value, named `{column}_{value}`.
fn one_hot(column: &str, keys: &[Option<String>]) -> Vec<(String, Vec<f64>)> {
    let mut levels: Vec<&str> = Vec::new();
    for key in keys.iter().flatten() {
        if !levels.contains(&key.as_str()) {
            levels.push(key.as_str());
        }
    }

    levels
        .into_iter()
        .map(|level| {
            let indicator = keys
                .iter()
                .map(|k| if k.as_deref() == Some(level) { 1.0 } else { 0.0 })
                .collect();
            (format!("{column}_{level}"), indicator)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const CSV: &str = "\
date,price,region,label
2020-01-01,1.5,north,0
2020-01-02,2.5,south,1
2020-01-03,,north,1
2020-01-04,4.0,,0
";

    fn write_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("table.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        path
    }

    fn options() -> LoadOptions {
        LoadOptions::new("label")
            .with_categorical(vec!["region".into()])
            .with_drop(vec!["date".into()])
    }

    #[test]
    fn factorize_keeps_categorical_column() {
        let dir = tempdir().unwrap();
        let frame = FrameLoader::new(options()).load(write_csv(dir.path())).unwrap();

        assert_eq!(frame.columns(), &["price".to_string(), "region".to_string()]);
        assert_eq!(frame.categorical(), &["region".to_string()]);
        assert_eq!(frame.target(), &[0.0, 1.0, 1.0, 0.0]);

        let region = frame.column("region").unwrap();
        assert_eq!(&region[..3], &[0.0, 1.0, 0.0]);
        assert!(region[3].is_nan());
        assert!(frame.column("price").unwrap()[2].is_nan());
    }

    #[test]
    fn one_hot_expands_levels() {
        let dir = tempdir().unwrap();
        let frame = FrameLoader::new(options().with_encoding(Encoding::OneHot))
            .load(write_csv(dir.path()))
            .unwrap();

        assert_eq!(
            frame.columns(),
            &[
                "price".to_string(),
                "region_north".to_string(),
                "region_south".to_string()
            ]
        );
        assert!(frame.categorical().is_empty());
        assert_eq!(frame.column("region_north").unwrap(), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(frame.column("region_south").unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn undeclared_text_column_fails() {
        let dir = tempdir().unwrap();
        let err = FrameLoader::new(LoadOptions::new("label").with_drop(vec!["date".into()]))
            .load(write_csv(dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn missing_target_column_fails() {
        let dir = tempdir().unwrap();
        let err = FrameLoader::new(LoadOptions::new("outcome").with_drop(vec!["date".into()]))
            .load(write_csv(dir.path()))
            .unwrap_err();
        assert!(matches!(
            err,
            BsError::Data(DataError::ColumnNotFound { ref column }) if column == "outcome"
        ));
    }

    #[test]
    fn unknown_categorical_column_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stores.csv");
        fs::write(&path, "price,store_id,label\n1.0,3,0\n2.0,4,1\n").unwrap();

        let err = FrameLoader::new(LoadOptions::new("label").with_categorical(vec!["store".into()]))
            .load(&path)
            .unwrap_err();
        assert!(matches!(
            err,
            BsError::Data(DataError::ColumnNotFound { ref column }) if column == "store"
        ));
    }

    #[test]
    fn unknown_drop_column_fails() {
        let dir = tempdir().unwrap();
        let err = FrameLoader::new(options().with_drop(vec!["timestamp".into()]))
            .load(write_csv(dir.path()))
            .unwrap_err();
        assert!(matches!(err, BsError::Data(DataError::ColumnNotFound { .. })));
    }
}
