use chrono::{DateTime, Utc};
use intake_core::{FieldError, RESPONSE_VERSION, RecordType};
use intake_rules::{RuleWarning, Violation};

use crate::audit::AuditRecord;
use crate::model::{BatchSummary, FileStatus, RowOutcome, SeverityCounts, ValidationResponse};

/// Identity of the file an aggregate describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub source: String,
    pub record_type: Option<RecordType>,
    pub rule_set_fingerprint: String,
    pub rule_warnings: Vec<RuleWarning>,
}

/// Incremental, purely additive roll-up of batch results.
///
/// Row outcomes are folded in batch by batch, so only their recorded errors
/// outlive the batch.
#[derive(Debug, Clone)]
pub struct Aggregator {
    meta: FileMeta,
    total_rows: u64,
    valid_rows: u64,
    invalid_rows: u64,
    counts: SeverityCounts,
    field_errors: Vec<FieldError>,
    violations: Vec<Violation>,
    batches: Vec<BatchSummary>,
}

impl Aggregator {
    pub fn new(meta: FileMeta) -> Self {
        Self {
            meta,
            total_rows: 0,
            valid_rows: 0,
            invalid_rows: 0,
            counts: SeverityCounts::default(),
            field_errors: Vec::new(),
            violations: Vec::new(),
            batches: Vec::new(),
        }
    }

    pub fn push_batch(&mut self, summary: BatchSummary, outcomes: Vec<RowOutcome>) {
        self.push_summary(summary);
        self.push_outcomes(outcomes);
    }

    fn push_summary(&mut self, summary: BatchSummary) {
        self.total_rows += summary.total_rows;
        self.valid_rows += summary.valid_rows;
        self.invalid_rows += summary.invalid_rows;
        self.counts.add(&summary.counts);
        self.batches.push(summary);
    }

    fn push_outcomes(&mut self, outcomes: impl IntoIterator<Item = RowOutcome>) {
        for outcome in outcomes {
            self.field_errors.extend(outcome.field_errors);
            self.violations.extend(outcome.violations);
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Close the aggregate.
    ///
    /// A failed file loads nothing, so every row read before the failure is
    /// counted invalid at file and batch level. Recorded errors are kept.
    pub fn finish(mut self, status: FileStatus, file_error: Option<String>) -> ValidationResponse {
        self.field_errors.sort_by_key(|error| error.row_index);
        self.violations.sort_by_key(|violation| violation.row_index);
        self.batches.sort_by_key(|batch| batch.batch_index);

        if status == FileStatus::Failed {
            self.valid_rows = 0;
            self.invalid_rows = self.total_rows;
            for batch in &mut self.batches {
                batch.valid_rows = 0;
                batch.invalid_rows = batch.total_rows;
            }
        }

        ValidationResponse {
            response_version: RESPONSE_VERSION.to_string(),
            source: self.meta.source,
            record_type: self.meta.record_type,
            status,
            total_rows: self.total_rows,
            valid_rows: self.valid_rows,
            invalid_rows: self.invalid_rows,
            critical_errors: self.counts.critical,
            warnings: self.counts.warning,
            info_messages: self.counts.info,
            field_errors: self.field_errors,
            business_violations: self.violations,
            rule_warnings: self.meta.rule_warnings,
            batches: self.batches,
            file_error,
            rule_set_fingerprint: self.meta.rule_set_fingerprint,
        }
    }
}

/// Roll batch summaries and row outcomes into a response and its audit record.
pub fn aggregate(
    meta: FileMeta,
    summaries: impl IntoIterator<Item = BatchSummary>,
    outcomes: impl IntoIterator<Item = RowOutcome>,
    status: FileStatus,
    file_error: Option<String>,
    processed_at: DateTime<Utc>,
) -> Result<(ValidationResponse, AuditRecord), serde_json::Error> {
    let mut aggregator = Aggregator::new(meta);
    for summary in summaries {
        aggregator.push_summary(summary);
    }
    aggregator.push_outcomes(outcomes);

    let response = aggregator.finish(status, file_error);
    let audit = AuditRecord::from_response(&response, processed_at)?;
    Ok((response, audit))
}
