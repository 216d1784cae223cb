use std::collections::BTreeMap;

use intake_core::{FieldError, RecordType, Severity, Value};
use intake_rules::{RuleWarning, Violation};
use serde::{Deserialize, Serialize};

/// Typed values of a row that passed validation, keyed by field name.
pub type WarehouseRow = BTreeMap<String, Value>;

/// Final state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Completed,
    Failed,
    Cancelled,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
            FileStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of validating one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_index: u64,
    pub is_valid: bool,
    pub field_errors: Vec<FieldError>,
    pub violations: Vec<Violation>,
}

impl RowOutcome {
    pub fn new(row_index: u64, field_errors: Vec<FieldError>, violations: Vec<Violation>) -> Self {
        let is_valid = !field_errors
            .iter()
            .any(|error| error.severity.invalidates_row())
            && !violations
                .iter()
                .any(|violation| violation.severity.invalidates_row());
        Self {
            row_index,
            is_valid,
            field_errors,
            violations,
        }
    }

    fn severities(&self) -> impl Iterator<Item = Severity> + '_ {
        self.field_errors
            .iter()
            .map(|error| error.severity)
            .chain(self.violations.iter().map(|violation| violation.severity))
    }
}

/// Field errors and violations counted by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub warning: u64,
    pub info: u64,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn add(&mut self, other: &SeverityCounts) {
        self.critical += other.critical;
        self.warning += other.warning;
        self.info += other.info;
    }
}

/// Counters for one batch of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_index: u64,
    pub first_row: u64,
    pub last_row: u64,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    pub counts: SeverityCounts,
}

impl BatchSummary {
    pub fn from_outcomes(batch_index: u64, outcomes: &[RowOutcome]) -> Self {
        let mut counts = SeverityCounts::default();
        let mut valid_rows = 0;
        for outcome in outcomes {
            if outcome.is_valid {
                valid_rows += 1;
            }
            for severity in outcome.severities() {
                counts.record(severity);
            }
        }

        let total_rows = outcomes.len() as u64;
        Self {
            batch_index,
            first_row: outcomes.iter().map(|o| o.row_index).min().unwrap_or(0),
            last_row: outcomes.iter().map(|o| o.row_index).max().unwrap_or(0),
            total_rows,
            valid_rows,
            invalid_rows: total_rows - valid_rows,
            counts,
        }
    }
}

/// File-level validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub response_version: String,
    pub source: String,
    /// `None` when the source names no known record type.
    pub record_type: Option<RecordType>,
    pub status: FileStatus,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    pub critical_errors: u64,
    pub warnings: u64,
    pub info_messages: u64,
    pub field_errors: Vec<FieldError>,
    pub business_violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rule_warnings: Vec<RuleWarning>,
    pub batches: Vec<BatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_error: Option<String>,
    pub rule_set_fingerprint: String,
}

impl ValidationResponse {
    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Completed
    }
}
