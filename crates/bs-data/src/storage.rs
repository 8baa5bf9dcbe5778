use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bs_types::{BsError, BsResult, DataError, Frame};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

const TABLE_EXTENSION: &str = "parquet";

/// Hierarchical location of a table: `backend/encoding/tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub backend: String,
    pub encoding: String,
    pub tag: String,
}

impl StoreKey {
    pub fn new(
        backend: impl Into<String>,
        encoding: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            encoding: encoding.into(),
            tag: tag.into(),
        }
    }

    /// Same backend/encoding, different result set.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.backend, self.encoding, self.tag)
    }
}

/// Parquet-backed table store. Every write replaces the whole table.
#[derive(Debug)]
pub struct ResultStore {
    pub data_root: PathBuf,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(data_root: P) -> BsResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        fs::create_dir_all(&data_root)?;

        Ok(Self { data_root })
    }

    /// Generate the storage path for a key
    pub fn table_path(&self, key: &StoreKey) -> PathBuf {
        self.data_root
            .join(&key.backend)
            .join(&key.encoding)
            .join(format!("{}.{}", key.tag, TABLE_EXTENSION))
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.table_path(key).is_file()
    }

    /// Replace the table stored at `key`.
    ///
    /// The snapshot is written to a temporary sibling and renamed over the
    /// previous file, so a crash mid-write leaves the last good snapshot.
    pub fn write_table(&self, key: &StoreKey, batch: &RecordBatch) -> BsResult<PathBuf> {
        let path = self.table_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension(format!("{TABLE_EXTENSION}.tmp"));

        let file = fs::File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| BsError::Parquet(e.to_string()))?;
        writer
            .write(batch)
            .map_err(|e| BsError::Parquet(e.to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| BsError::Parquet(e.to_string()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &path)?;
        tracing::debug!("Wrote {} rows to {}", batch.num_rows(), key);
        Ok(path)
    }

    /// Read the table stored at `key` as a single batch.
    pub fn read_table(&self, key: &StoreKey) -> BsResult<RecordBatch> {
        let path = self.table_path(key);
        if !path.exists() {
            return Err(DataError::LoadingFailed {
                message: format!("no table stored at {key}"),
            }
            .into());
        }

        let file = fs::File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| BsError::Parquet(e.to_string()))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| BsError::Parquet(e.to_string()))?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BsError::Arrow(e.to_string()))?;
        concat_batches(&schema, &batches).map_err(|e| BsError::Arrow(e.to_string()))
    }
}

/// Convert a frame to a record batch: one Float64 column per feature,
/// followed by the target column.
pub fn frame_to_record_batch(frame: &Frame, target_name: &str) -> BsResult<RecordBatch> {
    let mut fields = Vec::with_capacity(frame.n_cols() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.n_cols() + 1);

    for (idx, name) in frame.columns().iter().enumerate() {
        let values: Vec<f64> = (0..frame.n_rows()).map(|r| frame.row(r)[idx]).collect();
        fields.push(Field::new(name, DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(values)));
    }
    fields.push(Field::new(target_name, DataType::Float64, false));
    arrays.push(Arc::new(Float64Array::from(frame.target().to_vec())));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| BsError::Arrow(e.to_string()))
}
