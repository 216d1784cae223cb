use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{RawValue, Severity};

/// One row as parsed from the source format.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based position of the row within its source file.
    pub index: u64,
    pub fields: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new(index: u64) -> Self {
        Self {
            index,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: RawValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.with(name, RawValue::Text(value.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }
}

/// Machine-readable category of a field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    Required,
    TypeMismatch,
    MaxLength,
    MinLength,
    BelowMinimum,
    AboveMaximum,
    NotAllowed,
    PatternMismatch,
    InFuture,
    TooEarly,
    /// The row itself could not be parsed from the source format.
    RowParse,
}

impl FieldErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorCode::Required => "required",
            FieldErrorCode::TypeMismatch => "type_mismatch",
            FieldErrorCode::MaxLength => "max_length",
            FieldErrorCode::MinLength => "min_length",
            FieldErrorCode::BelowMinimum => "below_minimum",
            FieldErrorCode::AboveMaximum => "above_maximum",
            FieldErrorCode::NotAllowed => "not_allowed",
            FieldErrorCode::PatternMismatch => "pattern_mismatch",
            FieldErrorCode::InFuture => "in_future",
            FieldErrorCode::TooEarly => "too_early",
            FieldErrorCode::RowParse => "row_parse",
        }
    }
}

/// Structural validation failure for one field of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub row_index: u64,
    pub field: String,
    pub code: FieldErrorCode,
    pub severity: Severity,
    pub message: String,
}

impl FieldError {
    pub fn new(
        row_index: u64,
        field: impl Into<String>,
        code: FieldErrorCode,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row_index,
            field: field.into(),
            code,
            severity,
            message: message.into(),
        }
    }

    /// Synthetic CRITICAL error for a row the reader could not parse.
    pub fn row_parse(row_index: u64, message: impl Into<String>) -> Self {
        Self::new(
            row_index,
            "*",
            FieldErrorCode::RowParse,
            Severity::Critical,
            message,
        )
    }
}
