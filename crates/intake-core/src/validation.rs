use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::row::{FieldError, FieldErrorCode, RawRow};
use crate::schema::{ConstraintKind, FieldConstraint, FieldSchema, FieldSpec};
use crate::types::{FieldType, RawValue, Severity, Value, parse_decimal};

/// Validate internal consistency of a field schema.
///
/// This checks:
/// - duplicate field names
/// - aliases pointing at undeclared fields
/// - constraints that cannot apply to the field type
/// - invalid regex patterns and inverted numeric bounds
pub fn validate_schema(schema: &FieldSchema) -> Result<()> {
    let mut names = BTreeSet::new();
    for field in &schema.fields {
        if !names.insert(field.name.clone()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate field name: {}.{}",
                schema.record_type, field.name
            )));
        }
    }

    for (alias, target) in &schema.aliases {
        if !names.contains(target) {
            return Err(Error::InvalidSchema(format!(
                "alias '{alias}' points at unknown field: {}.{target}",
                schema.record_type
            )));
        }
    }

    for field in &schema.fields {
        let mut min_bound: Option<Decimal> = None;
        let mut max_bound: Option<Decimal> = None;

        for constraint in &field.constraints {
            if !constraint.kind.applies_to(field.field_type) {
                return Err(Error::InvalidSchema(format!(
                    "constraint '{}' cannot apply to {} field: {}.{}",
                    constraint.kind.name(),
                    field.field_type.as_str(),
                    schema.record_type,
                    field.name
                )));
            }

            match &constraint.kind {
                ConstraintKind::Pattern { regex } => {
                    Regex::new(regex).map_err(|err| {
                        Error::InvalidSchema(format!(
                            "invalid pattern for {}.{}: {err}",
                            schema.record_type, field.name
                        ))
                    })?;
                }
                ConstraintKind::Min { value, .. } => min_bound = Some(*value),
                ConstraintKind::Max { value, .. } => max_bound = Some(*value),
                _ => {}
            }
        }

        if let (Some(min), Some(max)) = (min_bound, max_bound)
            && min > max
        {
            return Err(Error::InvalidSchema(format!(
                "minimum {min} exceeds maximum {max}: {}.{}",
                schema.record_type, field.name
            )));
        }
    }

    Ok(())
}

/// Coerced values and field errors for one row.
#[derive(Debug, Clone, Default)]
pub struct RowCheck {
    /// Typed values of declared fields, keyed by canonical name.
    pub values: BTreeMap<String, Value>,
    pub errors: Vec<FieldError>,
}

impl RowCheck {
    pub fn has_critical(&self) -> bool {
        self.errors
            .iter()
            .any(|error| error.severity.invalidates_row())
    }
}

/// Schema validator with patterns compiled once per schema.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: FieldSchema,
    patterns: HashMap<String, Regex>,
}

impl SchemaValidator {
    pub fn new(schema: FieldSchema) -> Result<Self> {
        validate_schema(&schema)?;

        let mut patterns = HashMap::new();
        for field in &schema.fields {
            for constraint in &field.constraints {
                if let ConstraintKind::Pattern { regex } = &constraint.kind {
                    let compiled = Regex::new(regex)
                        .map_err(|err| Error::InvalidSchema(err.to_string()))?;
                    patterns.insert(regex.clone(), compiled);
                }
            }
        }

        Ok(Self { schema, patterns })
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Check every declared field of the row, collecting all errors.
    ///
    /// `as_of` is the processing date used by temporal bounds.
    pub fn check(&self, row: &RawRow, as_of: NaiveDate) -> RowCheck {
        let resolved = self.resolve_fields(row);
        let mut check = RowCheck::default();

        for field in &self.schema.fields {
            let raw = resolved.get(field.name.as_str()).copied();
            match raw {
                None => self.missing(row.index, field, &mut check),
                Some(raw) if raw.is_null() => self.missing(row.index, field, &mut check),
                Some(raw) => match coerce(field.field_type, raw) {
                    Ok(value) => {
                        for constraint in &field.constraints {
                            if let Some(error) =
                                self.apply_constraint(row.index, field, constraint, &value, as_of)
                            {
                                check.errors.push(error);
                            }
                        }
                        check.values.insert(field.name.clone(), value);
                    }
                    Err(message) => {
                        check.errors.push(FieldError::new(
                            row.index,
                            field.name.clone(),
                            FieldErrorCode::TypeMismatch,
                            Severity::Critical,
                            message,
                        ));
                        check.values.insert(field.name.clone(), Value::Null);
                    }
                },
            }
        }

        check
    }

    fn resolve_fields<'a>(&self, row: &'a RawRow) -> HashMap<String, &'a RawValue> {
        let mut resolved: HashMap<String, &'a RawValue> = HashMap::new();
        let mut direct = BTreeSet::new();

        for (name, value) in &row.fields {
            let lowered = name.trim().to_lowercase();
            let canonical = self.schema.canonical_name(&lowered);
            if canonical == lowered {
                direct.insert(canonical.clone());
                resolved.insert(canonical, value);
            } else if !direct.contains(&canonical) {
                resolved.entry(canonical).or_insert(value);
            }
        }

        resolved
    }

    fn missing(&self, row_index: u64, field: &FieldSpec, check: &mut RowCheck) {
        if field.required {
            check.errors.push(FieldError::new(
                row_index,
                field.name.clone(),
                FieldErrorCode::Required,
                Severity::Critical,
                format!("field '{}' is required", field.name),
            ));
        }
        check.values.insert(field.name.clone(), Value::Null);
    }

    fn apply_constraint(
        &self,
        row_index: u64,
        field: &FieldSpec,
        constraint: &FieldConstraint,
        value: &Value,
        as_of: NaiveDate,
    ) -> Option<FieldError> {
        let failure = match (&constraint.kind, value) {
            (ConstraintKind::MaxLength { max }, Value::Text(text)) => {
                (text.chars().count() > *max).then(|| {
                    (
                        FieldErrorCode::MaxLength,
                        format!("field '{}' exceeds {max} characters", field.name),
                    )
                })
            }
            (ConstraintKind::MinLength { min }, Value::Text(text)) => {
                (text.chars().count() < *min).then(|| {
                    (
                        FieldErrorCode::MinLength,
                        format!("field '{}' must be at least {min} characters", field.name),
                    )
                })
            }
            (ConstraintKind::Min { value: bound, exclusive }, Value::Number(number)) => {
                let fails = if *exclusive {
                    number <= bound
                } else {
                    number < bound
                };
                fails.then(|| {
                    let relation = if *exclusive {
                        "greater than"
                    } else {
                        "at least"
                    };
                    (
                        FieldErrorCode::BelowMinimum,
                        format!("field '{}' must be {relation} {bound}", field.name),
                    )
                })
            }
            (ConstraintKind::Max { value: bound, exclusive }, Value::Number(number)) => {
                let fails = if *exclusive {
                    number >= bound
                } else {
                    number > bound
                };
                fails.then(|| {
                    let relation = if *exclusive { "less than" } else { "at most" };
                    (
                        FieldErrorCode::AboveMaximum,
                        format!("field '{}' must be {relation} {bound}", field.name),
                    )
                })
            }
            (ConstraintKind::OneOf { values }, Value::Text(text)) => {
                (!values.iter().any(|allowed| allowed == text)).then(|| {
                    (
                        FieldErrorCode::NotAllowed,
                        format!(
                            "field '{}' must be one of: {}",
                            field.name,
                            values.join(", ")
                        ),
                    )
                })
            }
            (ConstraintKind::Pattern { regex }, Value::Text(text)) => {
                let matches = self
                    .patterns
                    .get(regex)
                    .map(|compiled| compiled.is_match(text))
                    .unwrap_or(false);
                (!matches).then(|| {
                    (
                        FieldErrorCode::PatternMismatch,
                        format!("field '{}' does not match pattern {regex}", field.name),
                    )
                })
            }
            (ConstraintKind::NotInFuture, value) => value
                .as_date()
                .filter(|date| *date > as_of)
                .map(|_| {
                    (
                        FieldErrorCode::InFuture,
                        format!("field '{}' cannot be in the future", field.name),
                    )
                }),
            (ConstraintKind::NotBefore { date: bound }, value) => value
                .as_date()
                .filter(|date| date < bound)
                .map(|_| {
                    (
                        FieldErrorCode::TooEarly,
                        format!("field '{}' cannot be before {bound}", field.name),
                    )
                }),
            _ => None,
        };

        failure.map(|(code, message)| {
            FieldError::new(
                row_index,
                field.name.clone(),
                code,
                constraint.severity,
                constraint.message.clone().unwrap_or(message),
            )
        })
    }
}

/// Validate a row against a schema, returning every field error.
///
/// Convenience wrapper around [`SchemaValidator`] for one-off checks; an
/// inconsistent schema is reported as a single CRITICAL error on the row.
pub fn validate(row: &RawRow, schema: &FieldSchema, as_of: NaiveDate) -> Vec<FieldError> {
    match SchemaValidator::new(schema.clone()) {
        Ok(validator) => validator.check(row, as_of).errors,
        Err(err) => vec![FieldError::new(
            row.index,
            "*",
            FieldErrorCode::TypeMismatch,
            Severity::Critical,
            err.to_string(),
        )],
    }
}

/// Coerce a raw token into the declared field type.
pub fn coerce(field_type: FieldType, raw: &RawValue) -> std::result::Result<Value, String> {
    match (field_type, raw) {
        (_, RawValue::Null) => Ok(Value::Null),
        (FieldType::Text, RawValue::Text(text)) => Ok(Value::Text(text.trim().to_string())),
        (FieldType::Text, RawValue::Number(number)) => Ok(Value::Text(number.to_string())),
        (FieldType::Text, RawValue::Bool(flag)) => Ok(Value::Text(flag.to_string())),
        (FieldType::Integer, RawValue::Number(number)) => integer(*number, raw),
        (FieldType::Integer, RawValue::Text(text)) => parse_decimal(text)
            .ok_or_else(|| mismatch(field_type, raw))
            .and_then(|number| integer(number, raw)),
        (FieldType::Decimal, RawValue::Number(number)) => Ok(Value::Number(*number)),
        (FieldType::Decimal, RawValue::Text(text)) => parse_decimal(text)
            .map(Value::Number)
            .ok_or_else(|| mismatch(field_type, raw)),
        (FieldType::Boolean, RawValue::Bool(flag)) => Ok(Value::Bool(*flag)),
        (FieldType::Boolean, RawValue::Number(number)) if *number == Decimal::ONE => {
            Ok(Value::Bool(true))
        }
        (FieldType::Boolean, RawValue::Number(number)) if number.is_zero() => {
            Ok(Value::Bool(false))
        }
        (FieldType::Boolean, RawValue::Text(text)) => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| mismatch(field_type, raw)),
        (FieldType::Date, RawValue::Text(text)) => parse_date(text)
            .map(Value::Date)
            .ok_or_else(|| mismatch(field_type, raw)),
        (FieldType::Timestamp, RawValue::Text(text)) => parse_timestamp(text)
            .map(Value::Timestamp)
            .ok_or_else(|| mismatch(field_type, raw)),
        _ => Err(mismatch(field_type, raw)),
    }
}

fn integer(number: Decimal, raw: &RawValue) -> std::result::Result<Value, String> {
    if number.fract().is_zero() {
        Ok(Value::Number(number.trunc()))
    } else {
        Err(mismatch(FieldType::Integer, raw))
    }
}

fn mismatch(field_type: FieldType, raw: &RawValue) -> String {
    format!("invalid {} '{}'", field_type.as_str(), raw)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|value| value.naive_utc())
        })
        .or_else(|| parse_date(trimmed).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use crate::schema::FieldSpec;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap_or_default()
    }

    fn expense_schema() -> FieldSchema {
        FieldSchema::new(
            RecordType::Expense,
            vec![
                FieldSpec::required("amount", FieldType::Decimal).with(FieldConstraint::critical(
                    ConstraintKind::Min {
                        value: Decimal::ZERO,
                        exclusive: true,
                    },
                )),
                FieldSpec::required("description", FieldType::Text).with(
                    FieldConstraint::warning(ConstraintKind::MinLength { min: 10 }),
                ),
                FieldSpec::required("date", FieldType::Date)
                    .with(FieldConstraint::critical(ConstraintKind::NotInFuture)),
            ],
        )
        .with_alias("cost", "amount")
    }

    #[test]
    fn collects_every_field_error() {
        let row = RawRow::new(1)
            .with_text("amount", "abc")
            .with_text("description", "pens")
            .with_text("date", "2030-01-01");

        let errors = validate(&row, &expense_schema(), as_of());
        let codes = errors.iter().map(|error| error.code).collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                FieldErrorCode::TypeMismatch,
                FieldErrorCode::MinLength,
                FieldErrorCode::InFuture
            ]
        );
        assert_eq!(errors[1].severity, Severity::Warning);
    }

    #[test]
    fn aliases_resolve_and_canonical_names_win() {
        let validator = SchemaValidator::new(expense_schema()).expect("valid schema");
        let row = RawRow::new(3)
            .with_text("COST", "12.50")
            .with_text("description", "printer toner")
            .with_text("date", "2024-06-01");

        let check = validator.check(&row, as_of());
        assert!(check.errors.is_empty(), "{:?}", check.errors);
        assert_eq!(
            check.values.get("amount"),
            Some(&Value::Number(Decimal::new(1250, 2)))
        );

        let both = row.with_text("amount", "7");
        let check = validator.check(&both, as_of());
        assert_eq!(
            check.values.get("amount"),
            Some(&Value::Number(Decimal::new(7, 0)))
        );
    }

    #[test]
    fn missing_required_field_is_critical() {
        let row = RawRow::new(2).with_text("description", "office chairs x4");
        let errors = validate(&row, &expense_schema(), as_of());
        assert!(
            errors
                .iter()
                .any(|error| error.field == "amount" && error.code == FieldErrorCode::Required)
        );
        assert!(errors.iter().all(|error| error.row_index == 2));
    }

    #[test]
    fn integer_rejects_fractional_values() {
        assert!(coerce(FieldType::Integer, &RawValue::Text("3.5".to_string())).is_err());
        assert_eq!(
            coerce(FieldType::Integer, &RawValue::Text("3.0".to_string())),
            Ok(Value::Number(Decimal::new(3, 0)))
        );
    }

    #[test]
    fn timestamps_accept_common_layouts() {
        for text in [
            "2024-05-01T08:30:00",
            "2024-05-01 08:30:00",
            "2024-05-01T08:30:00Z",
        ] {
            assert!(
                coerce(FieldType::Timestamp, &RawValue::Text(text.to_string())).is_ok(),
                "{text}"
            );
        }
    }

    #[test]
    fn validate_schema_rejects_inconsistent_definitions() {
        let schema = FieldSchema::new(
            RecordType::Sales,
            vec![
                FieldSpec::required("quantity", FieldType::Integer)
                    .with(FieldConstraint::critical(ConstraintKind::MaxLength { max: 3 })),
            ],
        );
        assert!(validate_schema(&schema).is_err());

        let schema = FieldSchema::new(
            RecordType::Sales,
            vec![FieldSpec::required("quantity", FieldType::Integer)],
        )
        .with_alias("qty", "qty_total");
        assert!(validate_schema(&schema).is_err());
    }
}
