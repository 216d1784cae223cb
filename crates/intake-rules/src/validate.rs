use std::collections::HashSet;
use std::fs;
use std::path::Path;

use intake_core::FieldSchema;
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::compile::compile;
use crate::errors::{IssueSeverity, Result, RulesError, ValidationIssue, ValidationReport};
use crate::model::{RULE_SET_VERSION, Rule, RuleSet};
use crate::schema::rule_set_json_schema;

/// Validated rule document with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedRuleSet {
    pub rule_set: RuleSet,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a rule document against the rule-set JSON Schema.
pub fn validate_rule_set_json(rules_json: &Value, rules_schema: &Value) -> Result<ValidationReport> {
    let compiled =
        JSONSchema::compile(rules_schema).map_err(|err| RulesError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(rules_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }

    Ok(report)
}

/// Validate the document end-to-end, returning structured issues on failure.
pub fn validate_rule_set(
    rules_json: &Value,
    rules_schema: &Value,
) -> std::result::Result<ValidatedRuleSet, ValidationReport> {
    let structural = match validate_rule_set_json(rules_json, rules_schema) {
        Ok(report) => report,
        Err(err) => {
            return Err(single_error("schema_validation_error", "/", err.to_string(), None));
        }
    };

    if !structural.is_ok() {
        return Err(structural);
    }

    let rule_set: RuleSet = match serde_json::from_value(rules_json.clone()) {
        Ok(rule_set) => rule_set,
        Err(err) => {
            return Err(single_error("invalid_rules_json", "/", err.to_string(), None));
        }
    };

    let report = validate_semantics(&rule_set);
    if !report.is_ok() {
        return Err(report);
    }

    Ok(ValidatedRuleSet {
        rule_set,
        warnings: report.warnings,
    })
}

/// Read, parse and validate a rule document from disk.
pub fn load_rule_set(path: &Path) -> Result<ValidatedRuleSet> {
    let contents = fs::read_to_string(path)?;
    let rules_json: Value = serde_json::from_str(&contents)?;
    let rules_schema = serde_json::to_value(rule_set_json_schema())?;
    validate_rule_set(&rules_json, &rules_schema).map_err(RulesError::Invalid)
}

/// Compile every active rule against a field schema.
///
/// Compilation failures are errors here; at validation time the same rules are
/// skipped and reported as warnings instead.
pub fn check_rules(rules: &[Rule], schema: &FieldSchema) -> ValidationReport {
    let mut report = ValidationReport::default();

    for rule in rules {
        let base_path = format!("/rules/{}", rule.rule_id);
        if rule.record_type != schema.record_type {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "record_type_mismatch",
                format!("{base_path}/record_type"),
                format!(
                    "rule targets {} but was checked against {}",
                    rule.record_type, schema.record_type
                ),
                None,
            ));
            continue;
        }
        if !rule.active {
            continue;
        }
        if let Err(err) = compile(rule, schema) {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "compile_error",
                format!("{base_path}/expression"),
                err.to_string(),
                Some(format!("expression: {}", rule.expression)),
            ));
        }
    }

    report
}

fn validate_semantics(rule_set: &RuleSet) -> ValidationReport {
    let mut report = ValidationReport::default();

    if rule_set.rule_set_version != RULE_SET_VERSION {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "rule_set_version_mismatch",
            "/rule_set_version",
            format!(
                "rule_set_version '{}' is not supported (expected '{RULE_SET_VERSION}')",
                rule_set.rule_set_version
            ),
            None,
        ));
    }

    let mut seen = HashSet::new();
    for (idx, rule) in rule_set.rules.iter().enumerate() {
        let base_path = format!("/rules/{idx}");

        if rule.rule_id.trim().is_empty() {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "rule_id_empty",
                format!("{base_path}/rule_id"),
                "rule_id must not be empty",
                None,
            ));
        } else if !seen.insert(rule.rule_id.as_str()) {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "duplicate_rule_id",
                format!("{base_path}/rule_id"),
                format!("rule_id '{}' is defined more than once", rule.rule_id),
                Some("rule ids must be unique across the document".to_string()),
            ));
        }

        if rule.expression.trim().is_empty() {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "expression_empty",
                format!("{base_path}/expression"),
                "expression must not be empty",
                None,
            ));
        }

        if !rule.active {
            report.push_warning(ValidationIssue::new(
                IssueSeverity::Warning,
                "rule_inactive",
                format!("{base_path}/active"),
                format!("rule '{}' is inactive and will be skipped", rule.rule_id),
                None,
            ));
        }

        if rule.error_message.trim().is_empty() {
            report.push_warning(ValidationIssue::new(
                IssueSeverity::Warning,
                "error_message_missing",
                format!("{base_path}/error_message"),
                format!("rule '{}' has no error_message template", rule.rule_id),
                Some("violations will use a generated message".to_string()),
            ));
        }
    }

    report
}

fn single_error(
    code: &str,
    path: &str,
    message: String,
    hint: Option<String>,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.push_error(ValidationIssue::new(
        IssueSeverity::Error,
        code,
        path,
        message,
        hint,
    ));
    report
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
