//! Delimited-text containers shared by the CLI backends.

use std::fs;
use std::path::{Path, PathBuf};

use bs_types::{BsResult, Frame};

/// Header name of the label column, always written first.
pub const LABEL_COLUMN: &str = "label";

/// Token written for missing feature values.
pub const MISSING_VALUE: &str = "nan";

/// Layout of a delimited training file.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedFormat {
    pub delimiter: u8,
    pub header: bool,
}

impl DelimitedFormat {
    pub const CSV: Self = Self {
        delimiter: b',',
        header: true,
    };

    pub const CSV_NO_HEADER: Self = Self {
        delimiter: b',',
        header: false,
    };

    pub const TSV: Self = Self {
        delimiter: b'\t',
        header: true,
    };
}

/// Write `frame` as `label, features...` rows.
pub fn write_delimited(path: &Path, frame: &Frame, format: DelimitedFormat) -> BsResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter)
        .from_path(path)?;

    if format.header {
        let mut header = Vec::with_capacity(frame.n_cols() + 1);
        header.push(LABEL_COLUMN);
        header.extend(frame.columns().iter().map(String::as_str));
        writer.write_record(&header)?;
    }

    let mut record = Vec::with_capacity(frame.n_cols() + 1);
    for (features, label) in frame.rows() {
        record.clear();
        record.push(format_value(label));
        record.extend(features.iter().map(|&v| format_value(v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Integers print without a fractional part, so categorical codes stay
/// valid category tokens.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        MISSING_VALUE.to_string()
    } else {
        value.to_string()
    }
}

/// Create (or reuse) the working directory of one fold.
pub fn fold_dir(work_dir: &Path, fold: usize) -> BsResult<PathBuf> {
    let dir = work_dir.join(format!("fold_{fold}"));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
