use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RuleType;

/// Severity level for rule document issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Structured rule document issue with location and hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }
}

/// Aggregated issues found while loading or checking a rule document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Errors raised while reading rule documents or talking to a repository.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rule document rejected with {} error(s)", .0.errors.len())]
    Invalid(ValidationReport),
}

/// Result type for rule document operations.
pub type Result<T> = std::result::Result<T, RulesError>;

/// A rule expression could not be turned into a compiled predicate.
///
/// Non-fatal for a file: the rule is skipped and surfaced as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleCompilationError {
    #[error("expression is empty")]
    EmptyExpression,
    #[error("expression exceeds {max} bytes ({actual})")]
    TooLarge { max: usize, actual: usize },
    #[error("expression nesting exceeds depth {max} at {position}")]
    NestingTooDeep { max: usize, position: usize },
    #[error("unexpected `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        position: usize,
    },
    #[error("unterminated string literal at {position}")]
    UnterminatedString { position: usize },
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber { raw: String, position: usize },
    #[error("unknown field `{name}` at {position}")]
    UnknownField { name: String, position: usize },
    #[error("unknown function `{name}` at {position}")]
    UnknownFunction { name: String, position: usize },
    #[error("{function}() expects {expected} argument(s), found {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("type error at {position}: {message}")]
    Type { message: String, position: usize },
    #[error("expression must produce a boolean, found {found}")]
    NotBoolean { found: &'static str },
    #[error("{rule_type} rule {reason}")]
    Shape {
        rule_type: RuleType,
        reason: &'static str,
    },
}

/// A compiled rule failed while evaluating one row.
///
/// Converted into a synthetic WARNING violation; evaluation continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleEvaluationError {
    #[error("field `{0}` is missing from the row")]
    MissingField(String),
    #[error("null operand in {operation}")]
    NullOperand { operation: &'static str },
    #[error("cannot apply {operation} to {left} and {right}")]
    TypeMismatch {
        operation: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("numeric overflow in {operation}")]
    Overflow { operation: &'static str },
    #[error("predicate produced {found} instead of a boolean")]
    NotBoolean { found: &'static str },
}
