//! Core contracts and helpers for Intake.
//!
//! This crate defines record types, field schemas, typed values and the
//! structural (schema) validation layer shared by the rule engine and the CLI.

pub mod builtin;
pub mod error;
pub mod record;
pub mod row;
pub mod schema;
pub mod types;
pub mod validation;

pub use error::{Error, Result};
pub use record::RecordType;
pub use row::{FieldError, FieldErrorCode, RawRow};
pub use schema::{ConstraintKind, FieldConstraint, FieldSchema, FieldSpec};
pub use types::{FieldType, RawValue, Severity, Value, parse_decimal};
pub use validation::{RowCheck, SchemaValidator, coerce, validate, validate_schema};

/// Contract version stamped on serialized validation responses.
pub const RESPONSE_VERSION: &str = "0.1";
