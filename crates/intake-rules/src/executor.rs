use std::sync::Arc;

use intake_core::{FieldSchema, RecordType, Severity};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{Lookup, RuleCache};
use crate::compile::CompiledRule;
use crate::context::{FileContext, RowContext};
use crate::eval::evaluate_rule;
use crate::model::{Rule, fingerprint};

/// Origin of a business violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The rule predicate did not hold.
    Rule,
    /// The predicate could not be evaluated for this row.
    EvaluationError,
}

/// A failed business rule for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub row_index: u64,
    pub rule_id: String,
    pub severity: Severity,
    pub kind: ViolationKind,
    pub message: String,
}

/// A rule that was skipped for the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWarning {
    pub rule_id: String,
    pub code: String,
    pub message: String,
}

/// Rules resolved for one file, grouped by severity in evaluation order.
///
/// Built once per file through the rule cache; rules that fail to compile are
/// left out for the rest of that file and reported as warnings.
#[derive(Debug, Clone)]
pub struct RulePlan {
    pub record_type: RecordType,
    critical: Vec<Arc<CompiledRule>>,
    warning: Vec<Arc<CompiledRule>>,
    info: Vec<Arc<CompiledRule>>,
    pub warnings: Vec<RuleWarning>,
    pub inactive: usize,
    /// Fingerprint of the rule revisions the plan was built from.
    pub fingerprint: String,
}

impl RulePlan {
    pub fn build(rules: &[Rule], schema: &FieldSchema, cache: &RuleCache) -> Self {
        let mut ordered = rules.iter().collect::<Vec<_>>();
        ordered.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        let mut plan = RulePlan {
            record_type: schema.record_type,
            critical: Vec::new(),
            warning: Vec::new(),
            info: Vec::new(),
            warnings: Vec::new(),
            inactive: 0,
            fingerprint: fingerprint(rules),
        };

        for rule in ordered {
            if rule.record_type != schema.record_type {
                plan.warnings.push(RuleWarning {
                    rule_id: rule.rule_id.clone(),
                    code: "record_type_mismatch".to_string(),
                    message: format!(
                        "rule targets {} but the file is {}",
                        rule.record_type, schema.record_type
                    ),
                });
                continue;
            }

            match cache.get_or_compile(rule, schema) {
                Ok(Lookup::Compiled(compiled)) => match compiled.severity {
                    Severity::Critical => plan.critical.push(compiled),
                    Severity::Warning => plan.warning.push(compiled),
                    Severity::Info => plan.info.push(compiled),
                },
                Ok(Lookup::Inactive) => plan.inactive += 1,
                Err(err) => {
                    warn!(
                        event = "rule_compile_failed",
                        rule_id = %rule.rule_id,
                        error = %err
                    );
                    plan.warnings.push(RuleWarning {
                        rule_id: rule.rule_id.clone(),
                        code: "compile_error".to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        plan
    }

    /// Compiled rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<CompiledRule>> {
        self.critical
            .iter()
            .chain(self.warning.iter())
            .chain(self.info.iter())
    }

    pub fn len(&self) -> usize {
        self.critical.len() + self.warning.len() + self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any rule keeps per-file state, which forces ordered evaluation.
    pub fn is_stateful(&self) -> bool {
        self.rules().any(|rule| rule.stateful)
    }
}

/// Run the plan against one row.
///
/// CRITICAL rules run first and the first failure ends evaluation for the row.
/// Otherwise every WARNING and INFO rule runs and all failures are collected.
/// Evaluation errors become WARNING violations and never stop the row.
pub fn evaluate(row: &RowContext<'_>, file: &FileContext, plan: &RulePlan) -> Vec<Violation> {
    let mut violations = Vec::new();

    for rule in &plan.critical {
        match evaluate_rule(rule, row, file) {
            Ok(true) => {}
            Ok(false) => {
                violations.push(rule_violation(rule, row));
                return violations;
            }
            Err(err) => violations.push(evaluation_violation(rule, row, &err.to_string())),
        }
    }

    for rule in plan.warning.iter().chain(plan.info.iter()) {
        match evaluate_rule(rule, row, file) {
            Ok(true) => {}
            Ok(false) => violations.push(rule_violation(rule, row)),
            Err(err) => violations.push(evaluation_violation(rule, row, &err.to_string())),
        }
    }

    violations
}

fn rule_violation(rule: &CompiledRule, row: &RowContext<'_>) -> Violation {
    Violation {
        row_index: row.row_index,
        rule_id: rule.rule_id.clone(),
        severity: rule.severity,
        kind: ViolationKind::Rule,
        message: render_message(rule, row),
    }
}

fn evaluation_violation(rule: &CompiledRule, row: &RowContext<'_>, error: &str) -> Violation {
    Violation {
        row_index: row.row_index,
        rule_id: rule.rule_id.clone(),
        severity: Severity::Warning,
        kind: ViolationKind::EvaluationError,
        message: format!("rule {} could not be evaluated: {error}", rule.rule_id),
    }
}

/// Render `{field}` and `{rule_id}` placeholders; unknown placeholders stay verbatim.
pub fn render_message(rule: &CompiledRule, row: &RowContext<'_>) -> String {
    let template = rule.message_template.trim();
    if template.is_empty() {
        return format!("rule {} failed: {}", rule.rule_id, rule.expression);
    }

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };

        let key = after[..close].trim();
        if key == "rule_id" {
            rendered.push_str(&rule.rule_id);
        } else if let Some(value) = row.get(key) {
            rendered.push_str(&value.to_string());
        } else {
            rendered.push_str(&rest[open..open + close + 2]);
        }
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    rendered
}
