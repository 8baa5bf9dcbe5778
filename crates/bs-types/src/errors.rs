use thiserror::Error;

/// Main error type for the BoostSweep system
#[derive(Error, Debug)]
pub enum BsError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Data-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Row index {index} out of range for table with {rows} rows")]
    IndexOutOfRange { index: usize, rows: usize },

    #[error("Fold {fold} reuses row {index} in both train and validation sets")]
    OverlappingFold { fold: usize, index: usize },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },
}

/// Errors raised while driving a gradient-boosting backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{tool} executable not found: {message}")]
    ToolNotFound { tool: String, message: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} reported no {metric} values")]
    MissingMetric { tool: String, metric: String },

    #[error("Failed to parse {tool} output: {message}")]
    OutputParse { tool: String, message: String },

    #[error("ROC AUC is undefined when only one class is present ({rows} rows)")]
    SingleClass { rows: usize },
}

/// Search-loop errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Parameter grid is empty")]
    EmptyGrid,

    #[error("Expected {expected} fold datasets, got {actual}")]
    FoldCountMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter {parameter}: {message}")]
    InvalidParameter { parameter: String, message: String },
}

/// Result type alias for BoostSweep operations
pub type BsResult<T> = Result<T, BsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BsError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BsError::Config(format!($($arg)*))
    };
}
