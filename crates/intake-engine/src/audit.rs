use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use intake_core::RecordType;
use serde::{Deserialize, Serialize};

use crate::model::{FileStatus, ValidationResponse};

/// Persisted audit row for one processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub source_file: String,
    /// Empty when the record type is unknown.
    pub table_name: String,
    pub record_type: Option<RecordType>,
    pub status: FileStatus,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    /// Serialized [`ErrorSummary`].
    pub validation_errors: String,
    pub processed_at: String,
}

/// Compact error digest stored with the audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub critical_errors: u64,
    pub warnings: u64,
    pub info_messages: u64,
    /// Field error counts keyed by error code.
    pub field_errors: BTreeMap<String, u64>,
    /// Business violation counts keyed by rule id.
    pub business_violations: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_error: Option<String>,
}

impl ErrorSummary {
    pub fn from_response(response: &ValidationResponse) -> Self {
        let mut summary = ErrorSummary {
            critical_errors: response.critical_errors,
            warnings: response.warnings,
            info_messages: response.info_messages,
            file_error: response.file_error.clone(),
            ..ErrorSummary::default()
        };
        for error in &response.field_errors {
            *summary
                .field_errors
                .entry(error.code.as_str().to_string())
                .or_default() += 1;
        }
        for violation in &response.business_violations {
            *summary
                .business_violations
                .entry(violation.rule_id.clone())
                .or_default() += 1;
        }
        summary
    }
}

impl AuditRecord {
    pub fn from_response(
        response: &ValidationResponse,
        processed_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let summary = ErrorSummary::from_response(response);
        Ok(Self {
            source_file: response.source.clone(),
            table_name: response
                .record_type
                .map(|record_type| record_type.table_name())
                .unwrap_or_default(),
            record_type: response.record_type,
            status: response.status,
            total_rows: response.total_rows,
            valid_rows: response.valid_rows,
            invalid_rows: response.invalid_rows,
            validation_errors: serde_json::to_string(&summary)?,
            processed_at: processed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    pub fn error_summary(&self) -> Result<ErrorSummary, serde_json::Error> {
        serde_json::from_str(&self.validation_errors)
    }
}
