use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::RecordType;
use crate::types::{FieldType, Severity};

/// Ordered field schema for one record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub record_type: RecordType,
    /// Declared fields, in validation order.
    pub fields: Vec<FieldSpec>,
    /// Source column name (lowercase) to canonical field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
}

impl FieldSchema {
    pub fn new(record_type: RecordType, fields: Vec<FieldSpec>) -> Self {
        Self {
            record_type,
            fields,
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, source: &str, field: &str) -> Self {
        self.aliases
            .insert(source.to_lowercase(), field.to_lowercase());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        let name = name.to_lowercase();
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Map a source column name onto its canonical field name.
    pub fn canonical_name(&self, source: &str) -> String {
        let lowered = source.trim().to_lowercase();
        self.aliases.get(&lowered).cloned().unwrap_or(lowered)
    }

    pub fn table_name(&self) -> String {
        self.record_type.table_name()
    }
}

/// A declared field with its semantic type and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<FieldConstraint>,
}

impl FieldSpec {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_lowercase(),
            field_type,
            required: true,
            constraints: Vec::new(),
        }
    }

    pub fn optional(name: &str, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with(mut self, constraint: FieldConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A constraint plus the severity its failure is reported with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConstraint {
    #[serde(flatten)]
    pub kind: ConstraintKind,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Overrides the generated message when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Critical
}

impl FieldConstraint {
    pub fn critical(kind: ConstraintKind) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: None,
        }
    }

    /// Soft constraint: reported, but the row stays valid.
    pub fn warning(kind: ConstraintKind) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Constraint kinds supported by the schema validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    MaxLength {
        max: usize,
    },
    MinLength {
        min: usize,
    },
    Min {
        value: Decimal,
        #[serde(default)]
        exclusive: bool,
    },
    Max {
        value: Decimal,
        #[serde(default)]
        exclusive: bool,
    },
    OneOf {
        values: Vec<String>,
    },
    Pattern {
        regex: String,
    },
    /// Date must not be later than the processing date.
    NotInFuture,
    NotBefore {
        date: NaiveDate,
    },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::MaxLength { .. } => "max_length",
            ConstraintKind::MinLength { .. } => "min_length",
            ConstraintKind::Min { .. } => "min",
            ConstraintKind::Max { .. } => "max",
            ConstraintKind::OneOf { .. } => "one_of",
            ConstraintKind::Pattern { .. } => "pattern",
            ConstraintKind::NotInFuture => "not_in_future",
            ConstraintKind::NotBefore { .. } => "not_before",
        }
    }

    /// Whether the constraint can apply to a field of the given type.
    pub fn applies_to(&self, field_type: FieldType) -> bool {
        match self {
            ConstraintKind::MaxLength { .. }
            | ConstraintKind::MinLength { .. }
            | ConstraintKind::OneOf { .. }
            | ConstraintKind::Pattern { .. } => field_type == FieldType::Text,
            ConstraintKind::Min { .. } | ConstraintKind::Max { .. } => field_type.is_numeric(),
            ConstraintKind::NotInFuture | ConstraintKind::NotBefore { .. } => {
                field_type.is_temporal()
            }
        }
    }
}
