use std::fs;
use std::path::PathBuf;

use intake_core::RecordType;
use intake_rules::{
    JsonFileRuleRepository, RuleRepository, RulesError, check_rules, load_rule_set,
    rule_set_json_schema, validate_rule_set,
};
use serde_json::json;

fn temp_rules(contents: &serde_json::Value) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("intake_rules_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("rules.json");
    fs::write(&path, serde_json::to_vec_pretty(contents).expect("serialize")).expect("write");
    path
}

fn sample_document() -> serde_json::Value {
    json!({
        "rule_set_version": "0.1",
        "rules": [
            {
                "rule_id": "SALES_TOTAL",
                "record_type": "SALES",
                "rule_type": "COMPARISON",
                "expression": "total_amount == quantity * unit_price",
                "severity": "CRITICAL",
                "error_message": "total does not match for {transaction_id}",
                "version": 3,
                "updated_at": "2024-05-01T10:00:00Z"
            },
            {
                "rule_id": "EXP_LIMIT",
                "record_type": "EXPENSE",
                "rule_type": "RANGE",
                "expression": "amount < 500000",
                "severity": "CRITICAL",
                "active": false
            }
        ]
    })
}

#[test]
fn json_file_repository_serves_validated_rules() {
    let path = temp_rules(&sample_document());
    let repository = JsonFileRuleRepository::open(&path).expect("open");

    let sales = repository.fetch_rules(RecordType::Sales).expect("fetch");
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].version, 3);

    let expense = repository.fetch_rules(RecordType::Expense).expect("fetch");
    assert_eq!(expense.len(), 1);
    assert!(!expense[0].active);

    let codes = repository
        .warnings()
        .iter()
        .map(|issue| issue.code.as_str())
        .collect::<Vec<_>>();
    assert_eq!(codes, vec!["rule_inactive", "error_message_missing"]);
}

#[test]
fn reload_picks_up_new_versions() {
    let path = temp_rules(&sample_document());
    let mut repository = JsonFileRuleRepository::open(&path).expect("open");

    let mut updated = sample_document();
    updated["rules"][0]["version"] = json!(4);
    fs::write(&path, serde_json::to_vec(&updated).expect("serialize")).expect("write");
    repository.reload().expect("reload");

    let version = repository
        .fetch_rule_version("SALES_TOTAL")
        .expect("version")
        .expect("present");
    assert_eq!(version.version, 4);
}

#[test]
fn structural_errors_carry_json_pointers() {
    let schema = serde_json::to_value(rule_set_json_schema()).expect("schema");
    let mut document = sample_document();
    document["rules"][0]["severity"] = json!("FATAL");

    let report = validate_rule_set(&document, &schema).expect_err("invalid");
    assert!(!report.errors.is_empty());
    assert!(report.errors.iter().all(|issue| issue.code == "schema_violation"));
    assert!(
        report
            .errors
            .iter()
            .any(|issue| issue.path.starts_with("/rules/0"))
    );
}

#[test]
fn duplicate_rule_ids_are_rejected() {
    let mut document = sample_document();
    document["rules"][1]["rule_id"] = json!("SALES_TOTAL");
    let path = temp_rules(&document);

    match load_rule_set(&path) {
        Err(RulesError::Invalid(report)) => {
            assert_eq!(report.errors.len(), 1);
            assert_eq!(report.errors[0].code, "duplicate_rule_id");
            assert_eq!(report.errors[0].path, "/rules/1/rule_id");
        }
        other => panic!("expected duplicate rule id rejection, got {other:?}"),
    }
}

#[test]
fn check_rules_reports_compile_errors() {
    let mut document = sample_document();
    document["rules"][0]["expression"] = json!("total_amount == discount");
    let path = temp_rules(&document);
    let validated = load_rule_set(&path).expect("load");

    let sales = validated.rule_set.for_record_type(RecordType::Sales);
    let report = check_rules(&sales, &RecordType::Sales.schema());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "compile_error");
    assert!(report.errors[0].message.contains("discount"));
}

#[test]
fn bundled_rule_document_compiles_for_every_record_type() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../rules/default.rules.json");
    let validated = load_rule_set(&path).expect("bundled rules load");
    assert!(validated.warnings.is_empty());

    for record_type in RecordType::ALL {
        let rules = validated.rule_set.for_record_type(record_type);
        assert!(!rules.is_empty(), "no rules for {record_type}");
        let report = check_rules(&rules, &record_type.schema());
        assert!(report.is_ok(), "{record_type}: {:?}", report.errors);
    }
}
