use chrono::{NaiveDate, NaiveDateTime};
use intake_core::{FieldSchema, FieldType, RecordType, Severity, Value};

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::errors::RuleCompilationError;
use crate::model::{Rule, RuleType, RuleVersion};
use crate::parser::parse_expression;

/// Static type of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Boolean,
    Number,
    Text,
    Temporal,
    Null,
}

impl ExprType {
    pub fn name(&self) -> &'static str {
        match self {
            ExprType::Boolean => "boolean",
            ExprType::Number => "number",
            ExprType::Text => "text",
            ExprType::Temporal => "date",
            ExprType::Null => "null",
        }
    }

    fn of_field(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text => ExprType::Text,
            FieldType::Integer | FieldType::Decimal => ExprType::Number,
            FieldType::Boolean => ExprType::Boolean,
            FieldType::Date | FieldType::Timestamp => ExprType::Temporal,
        }
    }

    fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => ExprType::Null,
            Value::Bool(_) => ExprType::Boolean,
            Value::Number(_) => ExprType::Number,
            Value::Text(_) => ExprType::Text,
            Value::Date(_) | Value::Timestamp(_) => ExprType::Temporal,
        }
    }
}

/// An executable predicate derived from a stored rule.
///
/// Immutable once built; the cache shares it between workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_id: String,
    pub record_type: RecordType,
    pub rule_type: RuleType,
    pub severity: Severity,
    /// Source expression the predicate was compiled from.
    pub expression: String,
    pub message_template: String,
    pub version: RuleVersion,
    /// True when the predicate calls `unique()`.
    pub stateful: bool,
    pub(crate) predicate: Expr,
}

impl CompiledRule {
    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }

    /// Whether this entry was compiled from exactly the given rule revision.
    pub fn matches(&self, rule: &Rule) -> bool {
        self.version == rule.version_token() && self.expression == rule.expression
    }

    pub(crate) fn same_revision(&self, other: &CompiledRule) -> bool {
        self.version == other.version && self.expression == other.expression
    }
}

/// Compile a rule against the declared fields of its record type.
pub fn compile(rule: &Rule, schema: &FieldSchema) -> Result<CompiledRule, RuleCompilationError> {
    let mut predicate = parse_expression(&rule.expression)?;

    let result = check(&mut predicate, schema)?;
    if result != ExprType::Boolean {
        return Err(RuleCompilationError::NotBoolean {
            found: result.name(),
        });
    }
    check_shape(rule.rule_type, &predicate)?;

    Ok(CompiledRule {
        rule_id: rule.rule_id.clone(),
        record_type: rule.record_type,
        rule_type: rule.rule_type,
        severity: rule.severity,
        expression: rule.expression.clone(),
        message_template: rule.error_message.clone(),
        version: rule.version_token(),
        stateful: predicate.is_stateful(),
        predicate,
    })
}

fn check(expr: &mut Expr, schema: &FieldSchema) -> Result<ExprType, RuleCompilationError> {
    match expr {
        Expr::Literal(value) => Ok(ExprType::of_value(value)),
        Expr::Field { name, position } => schema
            .field(name)
            .map(|field| ExprType::of_field(field.field_type))
            .ok_or_else(|| RuleCompilationError::UnknownField {
                name: name.clone(),
                position: *position,
            }),
        Expr::Unary { op, expr, position } => {
            let position = *position;
            let inner = check(expr, schema)?;
            match op {
                UnaryOp::Not => expect_type(inner, ExprType::Boolean, "NOT", position),
                UnaryOp::Neg => expect_type(inner, ExprType::Number, "unary `-`", position),
            }
        }
        Expr::Binary {
            op,
            left,
            right,
            position,
        } => {
            let op = *op;
            let position = *position;
            let left_type = check(left, schema)?;
            let right_type = check(right, schema)?;

            if op.is_logical() {
                expect_type(left_type, ExprType::Boolean, op.symbol(), position)?;
                return expect_type(right_type, ExprType::Boolean, op.symbol(), position);
            }
            if op.is_arithmetic() {
                expect_type(left_type, ExprType::Number, op.symbol(), position)?;
                return expect_type(right_type, ExprType::Number, op.symbol(), position);
            }
            check_comparison(op, left, left_type, right, right_type, position)
        }
        Expr::Call {
            function,
            args,
            position,
            ..
        } => {
            let function = *function;
            let position = *position;
            match function {
                Function::Today => Ok(ExprType::Temporal),
                Function::Len => {
                    let arg = check(&mut args[0], schema)?;
                    expect_type(arg, ExprType::Text, "len()", position)?;
                    Ok(ExprType::Number)
                }
                Function::Abs => {
                    let arg = check(&mut args[0], schema)?;
                    expect_type(arg, ExprType::Number, "abs()", position)
                }
                Function::StartsWith => {
                    for arg in args.iter_mut() {
                        let arg_type = check(arg, schema)?;
                        expect_type(arg_type, ExprType::Text, "startswith()", position)?;
                    }
                    Ok(ExprType::Boolean)
                }
                Function::Unique => {
                    for arg in args.iter_mut() {
                        if !matches!(arg, Expr::Field { .. }) {
                            return Err(RuleCompilationError::Type {
                                message: "unique() arguments must be field references"
                                    .to_string(),
                                position,
                            });
                        }
                        check(arg, schema)?;
                    }
                    Ok(ExprType::Boolean)
                }
            }
        }
    }
}

fn check_comparison(
    op: BinaryOp,
    left: &mut Expr,
    left_type: ExprType,
    right: &mut Expr,
    right_type: ExprType,
    position: usize,
) -> Result<ExprType, RuleCompilationError> {
    let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);

    if left_type == ExprType::Null || right_type == ExprType::Null {
        if equality {
            return Ok(ExprType::Boolean);
        }
        return Err(type_error(
            format!("NULL can only be compared with == or !=, found {}", op.symbol()),
            position,
        ));
    }

    if left_type == ExprType::Temporal && right_type == ExprType::Text {
        temporal_literal(right, position)?;
        return Ok(ExprType::Boolean);
    }
    if left_type == ExprType::Text && right_type == ExprType::Temporal {
        temporal_literal(left, position)?;
        return Ok(ExprType::Boolean);
    }

    if left_type != right_type {
        return Err(type_error(
            format!(
                "cannot compare {} {} {}",
                left_type.name(),
                op.symbol(),
                right_type.name()
            ),
            position,
        ));
    }
    if left_type == ExprType::Boolean && !equality {
        return Err(type_error(
            format!("booleans only support == and !=, found {}", op.symbol()),
            position,
        ));
    }

    Ok(ExprType::Boolean)
}

/// Rewrite a text literal compared against a date into a typed date literal.
fn temporal_literal(expr: &mut Expr, position: usize) -> Result<(), RuleCompilationError> {
    let Expr::Literal(Value::Text(text)) = expr else {
        return Err(type_error(
            "dates can only be compared with dates or date literals".to_string(),
            position,
        ));
    };

    let value = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Value::Date)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").map(Value::Timestamp))
        .map_err(|_| type_error(format!("'{text}' is not a date literal"), position))?;
    *expr = Expr::Literal(value);
    Ok(())
}

fn expect_type(
    found: ExprType,
    expected: ExprType,
    operation: &str,
    position: usize,
) -> Result<ExprType, RuleCompilationError> {
    if found == expected {
        Ok(expected)
    } else {
        Err(type_error(
            format!(
                "{operation} expects {}, found {}",
                expected.name(),
                found.name()
            ),
            position,
        ))
    }
}

fn type_error(message: String, position: usize) -> RuleCompilationError {
    RuleCompilationError::Type { message, position }
}

fn check_shape(rule_type: RuleType, predicate: &Expr) -> Result<(), RuleCompilationError> {
    let allowed = match rule_type {
        RuleType::Range => is_range(predicate),
        RuleType::Comparison => matches!(predicate, Expr::Binary { op, .. } if op.is_comparison()),
        RuleType::Business => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(RuleCompilationError::Shape {
            rule_type,
            reason: match rule_type {
                RuleType::Range => {
                    "must compare fields or function results against literals"
                }
                _ => "must have a comparison at the top level",
            },
        })
    }
}

fn is_range(expr: &Expr) -> bool {
    match expr {
        Expr::Binary {
            op, left, right, ..
        } if op.is_logical() => is_range(left) && is_range(right),
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
            ..
        } => is_range(expr),
        Expr::Binary {
            op, left, right, ..
        } if op.is_comparison() => {
            (is_subject(left) && right.is_literal()) || (left.is_literal() && is_subject(right))
        }
        _ => false,
    }
}

fn is_subject(expr: &Expr) -> bool {
    matches!(expr, Expr::Field { .. } | Expr::Call { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::FieldSpec;

    fn schema() -> FieldSchema {
        FieldSchema::new(
            RecordType::Sales,
            vec![
                FieldSpec::required("transaction_id", FieldType::Text),
                FieldSpec::required("quantity", FieldType::Integer),
                FieldSpec::required("unit_price", FieldType::Decimal),
                FieldSpec::required("total_amount", FieldType::Decimal),
                FieldSpec::optional("date", FieldType::Date),
            ],
        )
    }

    fn rule(rule_type: RuleType, expression: &str) -> Rule {
        Rule::new("R1", RecordType::Sales, rule_type, expression, Severity::Critical)
    }

    #[test]
    fn compiles_comparison_rule() {
        let compiled = compile(
            &rule(RuleType::Comparison, "total_amount == quantity * unit_price"),
            &schema(),
        )
        .expect("compile");
        assert!(!compiled.stateful);
        assert_eq!(compiled.version.version, 1);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = compile(&rule(RuleType::Business, "discount > 0"), &schema())
            .expect_err("unknown field");
        assert_eq!(
            err,
            RuleCompilationError::UnknownField {
                name: "discount".to_string(),
                position: 0
            }
        );
    }

    #[test]
    fn rejects_non_boolean_and_mistyped_expressions() {
        assert!(matches!(
            compile(&rule(RuleType::Business, "quantity * 2"), &schema()),
            Err(RuleCompilationError::NotBoolean { found: "number" })
        ));
        assert!(matches!(
            compile(&rule(RuleType::Business, "transaction_id > 5"), &schema()),
            Err(RuleCompilationError::Type { .. })
        ));
        assert!(matches!(
            compile(&rule(RuleType::Business, "date <= 'yesterday'"), &schema()),
            Err(RuleCompilationError::Type { .. })
        ));
    }

    #[test]
    fn date_literals_are_typed_at_compile_time() {
        let compiled = compile(
            &rule(RuleType::Business, "date >= '2024-01-01' AND date <= today()"),
            &schema(),
        )
        .expect("compile");
        let Expr::Binary { left, .. } = compiled.predicate() else {
            panic!("expected AND");
        };
        let Expr::Binary { right, .. } = left.as_ref() else {
            panic!("expected comparison");
        };
        assert!(matches!(right.as_ref(), Expr::Literal(Value::Date(_))));
    }

    #[test]
    fn enforces_rule_type_shapes() {
        assert!(compile(&rule(RuleType::Range, "quantity > 0 AND quantity < 100"), &schema()).is_ok());
        assert!(matches!(
            compile(&rule(RuleType::Range, "total_amount > quantity"), &schema()),
            Err(RuleCompilationError::Shape { .. })
        ));
        assert!(matches!(
            compile(
                &rule(RuleType::Comparison, "quantity > 0 AND unit_price > 0"),
                &schema()
            ),
            Err(RuleCompilationError::Shape { .. })
        ));
    }

    #[test]
    fn unique_marks_rule_stateful() {
        let compiled = compile(
            &rule(RuleType::Business, "unique(transaction_id)"),
            &schema(),
        )
        .expect("compile");
        assert!(compiled.stateful);
        assert!(
            compile(&rule(RuleType::Business, "unique(len(transaction_id))"), &schema()).is_err()
        );
    }
}
