//! Batch validation pipeline: reads a file, validates rows against the field
//! schema and business rules, loads valid rows and records an audit entry.

pub mod aggregate;
pub mod audit;
pub mod batch;
pub mod config;
pub mod errors;
pub mod format;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod processor;
pub mod reader;
pub mod report;
pub mod sinks;

pub use aggregate::{Aggregator, FileMeta, aggregate};
pub use audit::{AuditRecord, ErrorSummary};
pub use batch::batch_size_for;
pub use config::EngineConfig;
pub use errors::{EngineError, FileParseError, ReadError, Result, RowParseError};
pub use format::FileFormat;
pub use model::{
    BatchSummary, FileStatus, RowOutcome, SeverityCounts, ValidationResponse, WarehouseRow,
};
pub use pipeline::{FileRequest, Pipeline, PipelineOutcome};
pub use ports::{AuditError, AuditSink, LoadError, LoadId, WarehouseLoader};
pub use processor::{BatchProcessor, Batches, CancelToken, ProcessedBatch};
pub use reader::{RowResult, RowStream, open_rows};
pub use report::render_report;
pub use sinks::{CsvFileLoader, InMemoryAuditSink, InMemoryWarehouse, JsonLinesAuditSink};
