use std::cmp::Ordering;

use chrono::NaiveDateTime;
use intake_core::Value;
use rust_decimal::Decimal;

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::compile::CompiledRule;
use crate::context::{FileContext, RowContext};
use crate::errors::RuleEvaluationError;

/// Evaluate a compiled predicate against one row.
///
/// Returns whether the predicate holds; `false` means the row violates the rule.
pub fn evaluate_rule(
    rule: &CompiledRule,
    row: &RowContext<'_>,
    file: &FileContext,
) -> Result<bool, RuleEvaluationError> {
    let evaluator = Evaluator {
        rule_id: &rule.rule_id,
        row,
        file,
    };
    match evaluator.eval(rule.predicate())? {
        Value::Bool(result) => Ok(result),
        other => Err(RuleEvaluationError::NotBoolean {
            found: other.type_name(),
        }),
    }
}

struct Evaluator<'a, 'row> {
    rule_id: &'a str,
    row: &'a RowContext<'row>,
    file: &'a FileContext,
}

impl Evaluator<'_, '_> {
    fn eval(&self, expr: &Expr) -> Result<Value, RuleEvaluationError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field { name, .. } => self
                .row
                .get(name)
                .cloned()
                .ok_or_else(|| RuleEvaluationError::MissingField(name.clone())),
            Expr::Unary { op, expr, .. } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!boolean(&value, "NOT")?)),
                    UnaryOp::Neg => Ok(Value::Number(-number(&value, "unary `-`")?)),
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => match op {
                BinaryOp::And => {
                    if !boolean(&self.eval(left)?, "AND")? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(boolean(&self.eval(right)?, "AND")?))
                }
                BinaryOp::Or => {
                    if boolean(&self.eval(left)?, "OR")? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(boolean(&self.eval(right)?, "OR")?))
                }
                op if op.is_arithmetic() => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    arithmetic(*op, &left, &right)
                }
                op => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    compare(*op, &left, &right).map(Value::Bool)
                }
            },
            Expr::Call {
                function,
                args,
                call_site,
                ..
            } => self.call(*function, args, *call_site),
        }
    }

    fn call(
        &self,
        function: Function,
        args: &[Expr],
        call_site: usize,
    ) -> Result<Value, RuleEvaluationError> {
        match function {
            Function::Today => Ok(Value::Date(self.file.as_of())),
            Function::Len => {
                let value = self.eval_arg(args, 0)?;
                let text = text(&value, "len()")?;
                Ok(Value::Number(Decimal::from(text.chars().count())))
            }
            Function::StartsWith => {
                let value = self.eval_arg(args, 0)?;
                let prefix = self.eval_arg(args, 1)?;
                Ok(Value::Bool(
                    text(&value, "startswith()")?.starts_with(text(&prefix, "startswith()")?),
                ))
            }
            Function::Abs => {
                let value = self.eval_arg(args, 0)?;
                Ok(Value::Number(number(&value, "abs()")?.abs()))
            }
            Function::Unique => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs = values.iter().collect::<Vec<_>>();
                Ok(Value::Bool(
                    self.file.record_unique(self.rule_id, call_site, &refs),
                ))
            }
        }
    }

    fn eval_arg(&self, args: &[Expr], index: usize) -> Result<Value, RuleEvaluationError> {
        match args.get(index) {
            Some(arg) => self.eval(arg),
            None => Err(RuleEvaluationError::NullOperand {
                operation: "function call",
            }),
        }
    }
}

fn boolean(value: &Value, operation: &'static str) -> Result<bool, RuleEvaluationError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Null => Err(RuleEvaluationError::NullOperand { operation }),
        other => Err(RuleEvaluationError::TypeMismatch {
            operation,
            left: other.type_name(),
            right: "boolean",
        }),
    }
}

fn number(value: &Value, operation: &'static str) -> Result<Decimal, RuleEvaluationError> {
    match value {
        Value::Number(number) => Ok(*number),
        Value::Null => Err(RuleEvaluationError::NullOperand { operation }),
        other => Err(RuleEvaluationError::TypeMismatch {
            operation,
            left: other.type_name(),
            right: "number",
        }),
    }
}

fn text<'v>(value: &'v Value, operation: &'static str) -> Result<&'v str, RuleEvaluationError> {
    match value {
        Value::Text(text) => Ok(text),
        Value::Null => Err(RuleEvaluationError::NullOperand { operation }),
        other => Err(RuleEvaluationError::TypeMismatch {
            operation,
            left: other.type_name(),
            right: "text",
        }),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuleEvaluationError> {
    let operation = op.symbol();
    let left = number(left, operation)?;
    let right = number(right, operation)?;
    let result = match op {
        BinaryOp::Add => left.checked_add(right),
        BinaryOp::Sub => left.checked_sub(right),
        BinaryOp::Mul => left.checked_mul(right),
        BinaryOp::Div => {
            if right.is_zero() {
                return Err(RuleEvaluationError::DivisionByZero);
            }
            left.checked_div(right)
        }
        _ => None,
    };
    result
        .map(Value::Number)
        .ok_or(RuleEvaluationError::Overflow { operation })
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, RuleEvaluationError> {
    let operation = op.symbol();

    if left.is_null() || right.is_null() {
        return match op {
            BinaryOp::Eq => Ok(left.is_null() && right.is_null()),
            BinaryOp::Ne => Ok(!(left.is_null() && right.is_null())),
            _ => Err(RuleEvaluationError::NullOperand { operation }),
        };
    }

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => a.cmp(b),
        (a, b) => match (as_datetime(a), as_datetime(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                return Err(RuleEvaluationError::TypeMismatch {
                    operation,
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
        },
    };

    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    })
}

/// Dates compare as midnight timestamps so date and timestamp fields mix.
fn as_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(date) => date.and_hms_opt(0, 0, 0),
        Value::Timestamp(timestamp) => Some(*timestamp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use intake_core::{FieldSchema, FieldSpec, FieldType, RecordType, Severity};

    use super::*;
    use crate::compile::compile;
    use crate::model::{Rule, RuleType};

    fn schema() -> FieldSchema {
        FieldSchema::new(
            RecordType::Expense,
            vec![
                FieldSpec::required("expense_id", FieldType::Text),
                FieldSpec::required("amount", FieldType::Decimal),
                FieldSpec::required("date", FieldType::Date),
                FieldSpec::optional("justification", FieldType::Text),
            ],
        )
    }

    fn run(expression: &str, values: &BTreeMap<String, Value>) -> Result<bool, RuleEvaluationError> {
        let rule = Rule::new(
            "R1",
            RecordType::Expense,
            RuleType::Business,
            expression,
            Severity::Warning,
        );
        let compiled = compile(&rule, &schema()).expect("compile");
        let file = FileContext::new(NaiveDate::from_ymd_opt(2024, 6, 30).expect("date"));
        evaluate_rule(&compiled, &RowContext::new(1, RecordType::Expense, values), &file)
    }

    fn row(amount: &str) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        values.insert("expense_id".to_string(), Value::Text("EXP-20240601-001".to_string()));
        values.insert(
            "amount".to_string(),
            Value::Number(amount.parse().expect("decimal")),
        );
        values.insert(
            "date".to_string(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).expect("date")),
        );
        values.insert("justification".to_string(), Value::Null);
        values
    }

    #[test]
    fn arithmetic_is_exact() {
        assert_eq!(run("amount * 3 == 299.97", &row("99.99")), Ok(true));
        assert_eq!(run("amount / 3 > 33.32", &row("99.99")), Ok(true));
    }

    #[test]
    fn null_checks_short_circuit_before_errors() {
        let values = row("12000");
        assert_eq!(
            run("amount <= 10000 OR justification != NULL", &values),
            Ok(false)
        );
        assert_eq!(
            run("justification == NULL OR len(justification) > 5", &values),
            Ok(true)
        );
        assert_eq!(
            run("len(justification) > 5", &values),
            Err(RuleEvaluationError::NullOperand { operation: "len()" })
        );
    }

    #[test]
    fn functions_use_file_state() {
        let values = row("10");
        assert_eq!(run("date <= today()", &values), Ok(true));
        assert_eq!(run("startswith(expense_id, 'EXP-')", &values), Ok(true));
        assert_eq!(run("abs(0 - amount) == 10", &values), Ok(true));
    }

    #[test]
    fn runtime_errors_are_reported() {
        assert_eq!(
            run("amount / (amount - amount) > 1", &row("5")),
            Err(RuleEvaluationError::DivisionByZero)
        );

        let mut values = row("5");
        values.remove("amount");
        assert_eq!(
            run("amount > 1", &values),
            Err(RuleEvaluationError::MissingField("amount".to_string()))
        );
    }

    #[test]
    fn unique_detects_repeats_within_one_file() {
        let rule = Rule::new(
            "DUP",
            RecordType::Expense,
            RuleType::Business,
            "unique(expense_id)",
            Severity::Critical,
        );
        let compiled = compile(&rule, &schema()).expect("compile");
        let file = FileContext::new(NaiveDate::from_ymd_opt(2024, 6, 30).expect("date"));
        let values = row("5");
        let context = RowContext::new(1, RecordType::Expense, &values);

        assert_eq!(evaluate_rule(&compiled, &context, &file), Ok(true));
        assert_eq!(evaluate_rule(&compiled, &context, &file), Ok(false));
    }
}
