//! Collaborator interfaces the pipeline hands its results to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::audit::AuditRecord;
use crate::model::WarehouseRow;

/// Warehouse load failure. The pipeline never retries; `retryable` is advisory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("warehouse load into {table} failed: {message}")]
pub struct LoadError {
    pub table: String,
    pub message: String,
    pub retryable: bool,
}

/// Handle for the rows one file stages in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadId(u64);

static NEXT_LOAD: AtomicU64 = AtomicU64::new(1);

impl LoadId {
    /// A load id not handed out before in this process.
    pub fn next() -> Self {
        Self(NEXT_LOAD.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

/// Receives rows that passed validation.
///
/// Rows are staged batch by batch and only become visible in `table` once
/// the file completes and its load is committed. A failed or cancelled file
/// aborts its load instead.
pub trait WarehouseLoader: Send + Sync {
    /// Stage `rows` for `table` under `load`, returning the number of rows staged.
    fn stage(&self, load: LoadId, table: &str, rows: &[WarehouseRow]) -> Result<u64, LoadError>;

    /// Publish everything staged under `load`, returning the number of rows loaded.
    fn commit(&self, load: LoadId, table: &str) -> Result<u64, LoadError>;

    /// Drop everything staged under `load`.
    fn abort(&self, load: LoadId, table: &str) -> Result<(), LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Stores one audit record per processed file.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}
