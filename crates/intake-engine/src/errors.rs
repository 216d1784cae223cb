use intake_rules::RulesError;
use thiserror::Error;

/// Errors emitted by the file pipeline.
///
/// Row-level problems never surface here; they are recorded in the
/// [`crate::ValidationResponse`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("core error: {0}")]
    Core(#[from] intake_core::Error),
    #[error("rules error: {0}")]
    Rules(#[from] RulesError),
    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A single record could not be parsed; the rest of the file is still read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row_index}: {message}")]
pub struct RowParseError {
    pub row_index: u64,
    pub message: String,
}

/// The container itself is unreadable; no further rows can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("file parse error after {rows_read} row(s): {message}")]
pub struct FileParseError {
    pub rows_read: u64,
    pub message: String,
}

/// Failure reported by a format reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error(transparent)]
    Row(#[from] RowParseError),
    #[error(transparent)]
    File(#[from] FileParseError),
}
