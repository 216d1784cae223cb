use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use intake_core::{Error as CoreError, FieldSchema, RecordType, SchemaValidator};
use intake_rules::{RuleCache, RulePlan, RuleRepository, fingerprint};
use tracing::{info, warn};

use crate::aggregate::{Aggregator, FileMeta};
use crate::audit::AuditRecord;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::format::FileFormat;
use crate::model::{FileStatus, ValidationResponse};
use crate::ports::{AuditSink, LoadError, LoadId, WarehouseLoader};
use crate::processor::{BatchProcessor, CancelToken};
use crate::reader::open_rows;

/// A file handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Object key or path; also used to infer the record type and format.
    pub source: String,
    pub record_type: Option<RecordType>,
    pub content_type: Option<String>,
}

impl FileRequest {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            record_type: None,
            content_type: None,
        }
    }

    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// The declared record type, or the one inferred from the source key.
    pub fn record_type(&self) -> std::result::Result<RecordType, CoreError> {
        match self.record_type {
            Some(record_type) => Ok(record_type),
            None => RecordType::from_source_key(&self.source),
        }
    }
}

/// Everything produced for one file.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub response: ValidationResponse,
    pub audit: AuditRecord,
    pub loaded_rows: u64,
    pub load_errors: Vec<LoadError>,
}

/// Runs one file through validation, loading and auditing.
pub struct Pipeline<'a> {
    config: EngineConfig,
    cache: &'a RuleCache,
    repository: &'a dyn RuleRepository,
    loader: &'a dyn WarehouseLoader,
    audit: &'a dyn AuditSink,
    schemas: BTreeMap<RecordType, FieldSchema>,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: EngineConfig,
        cache: &'a RuleCache,
        repository: &'a dyn RuleRepository,
        loader: &'a dyn WarehouseLoader,
        audit: &'a dyn AuditSink,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache,
            repository,
            loader,
            audit,
            schemas: BTreeMap::new(),
            cancel: CancelToken::new(),
        })
    }

    /// Replace the built-in schema of `schema.record_type`.
    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schemas.insert(schema.record_type, schema);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema_for(&self, record_type: RecordType) -> FieldSchema {
        self.schemas
            .get(&record_type)
            .cloned()
            .unwrap_or_else(|| record_type.schema())
    }

    /// Validate a file on disk.
    ///
    /// Unknown record types, unsupported formats and unreadable files still
    /// produce a failed response and an audit record.
    pub fn process_path(&self, path: &Path, request: &FileRequest) -> Result<PipelineOutcome> {
        let record_type = match request.record_type() {
            Ok(record_type) => record_type,
            Err(err) => return self.fail_early(request, None, err.to_string()),
        };
        let format = match FileFormat::detect(&request.source, request.content_type.as_deref()) {
            Ok(format) => format,
            Err(err) => return self.fail_early(request, Some(record_type), err.to_string()),
        };

        let opened = File::open(path).and_then(|file| {
            let size = file.metadata()?.len();
            Ok((file, size))
        });
        match opened {
            Ok((file, size)) => self.run(request, record_type, format, file, size),
            Err(err) => self.fail_early(
                request,
                Some(record_type),
                format!("cannot open {}: {err}", path.display()),
            ),
        }
    }

    /// Validate an in-memory file.
    pub fn process_bytes(&self, request: &FileRequest, bytes: &[u8]) -> Result<PipelineOutcome> {
        let record_type = match request.record_type() {
            Ok(record_type) => record_type,
            Err(err) => return self.fail_early(request, None, err.to_string()),
        };
        match FileFormat::detect(&request.source, request.content_type.as_deref()) {
            Ok(format) => self.run(
                request,
                record_type,
                format,
                Cursor::new(bytes),
                bytes.len() as u64,
            ),
            Err(err) => self.fail_early(request, Some(record_type), err.to_string()),
        }
    }

    fn run<R: Read>(
        &self,
        request: &FileRequest,
        record_type: RecordType,
        format: FileFormat,
        reader: R,
        file_size: u64,
    ) -> Result<PipelineOutcome> {
        let timer = Instant::now();
        info!(
            event = "file_started",
            source = %request.source,
            record_type = %record_type,
            format = %format,
            file_size
        );

        let rules = self.repository.fetch_rules(record_type)?;
        let schema = self.schema_for(record_type);
        let validator = SchemaValidator::new(schema.clone())?;
        let plan = RulePlan::build(&rules, &schema, self.cache);

        let processor =
            BatchProcessor::new(&validator, &plan, &self.config, file_size, self.cancel.clone())?;
        info!(
            event = "rule_plan_ready",
            rules = plan.len(),
            inactive = plan.inactive,
            skipped = plan.warnings.len(),
            stateful = plan.is_stateful(),
            parallel = processor.is_parallel(),
            batch_size = processor.batch_size()
        );

        let mut aggregator = Aggregator::new(FileMeta {
            source: request.source.clone(),
            record_type: Some(record_type),
            rule_set_fingerprint: plan.fingerprint.clone(),
            rule_warnings: plan.warnings.clone(),
        });
        let table = record_type.table_name();
        let load = LoadId::next();
        let mut staged_rows = 0;
        let mut load_errors = Vec::new();

        let mut batches = processor.process(open_rows(format, reader));
        for batch in batches.by_ref() {
            if !batch.valid_rows.is_empty() && load_errors.is_empty() {
                match self.loader.stage(load, &table, &batch.valid_rows) {
                    Ok(count) => staged_rows += count,
                    Err(err) => {
                        warn!(
                            event = "warehouse_stage_failed",
                            table = %table,
                            load = %load,
                            batch_index = batch.summary.batch_index,
                            retryable = err.retryable,
                            error = %err
                        );
                        load_errors.push(err);
                    }
                }
            }
            aggregator.push_batch(batch.summary, batch.outcomes);
        }

        let (status, file_error) = match batches.file_error() {
            Some(err) => {
                warn!(event = "file_parse_failed", source = %request.source, error = %err);
                (FileStatus::Failed, Some(err.to_string()))
            }
            None if batches.was_cancelled() => {
                warn!(
                    event = "file_cancelled",
                    source = %request.source,
                    rows = aggregator.total_rows()
                );
                (FileStatus::Cancelled, None)
            }
            None => (FileStatus::Completed, None),
        };

        let loaded_rows = self.settle_load(load, &table, status, staged_rows, &mut load_errors);
        let response = aggregator.finish(status, file_error);
        let outcome = self.finish(response, loaded_rows, load_errors)?;
        info!(
            event = "file_finished",
            source = %request.source,
            status = outcome.response.status.as_str(),
            total_rows = outcome.response.total_rows,
            valid_rows = outcome.response.valid_rows,
            invalid_rows = outcome.response.invalid_rows,
            loaded_rows = outcome.loaded_rows,
            duration_ms = timer.elapsed().as_millis() as u64
        );
        Ok(outcome)
    }

    /// Commit the staged rows of a completed file, discard them otherwise.
    fn settle_load(
        &self,
        load: LoadId,
        table: &str,
        status: FileStatus,
        staged_rows: u64,
        load_errors: &mut Vec<LoadError>,
    ) -> u64 {
        if status == FileStatus::Completed && load_errors.is_empty() {
            match self.loader.commit(load, table) {
                Ok(loaded) => {
                    if loaded > 0 {
                        info!(
                            event = "warehouse_load_committed",
                            table = %table,
                            load = %load,
                            rows = loaded
                        );
                    }
                    return loaded;
                }
                Err(err) => {
                    warn!(
                        event = "warehouse_commit_failed",
                        table = %table,
                        load = %load,
                        retryable = err.retryable,
                        error = %err
                    );
                    load_errors.push(err);
                }
            }
        }

        if let Err(err) = self.loader.abort(load, table) {
            warn!(event = "warehouse_abort_failed", table = %table, load = %load, error = %err);
            load_errors.push(err);
        } else if staged_rows > 0 {
            info!(
                event = "warehouse_load_discarded",
                table = %table,
                load = %load,
                status = status.as_str(),
                rows = staged_rows
            );
        }
        0
    }

    fn fail_early(
        &self,
        request: &FileRequest,
        record_type: Option<RecordType>,
        reason: String,
    ) -> Result<PipelineOutcome> {
        warn!(event = "file_rejected", source = %request.source, reason = %reason);
        let rules = match record_type {
            Some(record_type) => self.repository.fetch_rules(record_type)?,
            None => Vec::new(),
        };
        let response = Aggregator::new(FileMeta {
            source: request.source.clone(),
            record_type,
            rule_set_fingerprint: fingerprint(&rules),
            rule_warnings: Vec::new(),
        })
        .finish(FileStatus::Failed, Some(reason));
        self.finish(response, 0, Vec::new())
    }

    fn finish(
        &self,
        response: ValidationResponse,
        loaded_rows: u64,
        load_errors: Vec<LoadError>,
    ) -> Result<PipelineOutcome> {
        let audit = AuditRecord::from_response(&response, Utc::now())?;
        if let Err(err) = self.audit.record(&audit) {
            warn!(event = "audit_record_failed", source = %audit.source_file, error = %err);
        }
        Ok(PipelineOutcome {
            response,
            audit,
            loaded_rows,
            load_errors,
        })
    }
}
