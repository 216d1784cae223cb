use std::collections::BTreeMap;

use chrono::NaiveDate;
use intake_core::{FieldSchema, FieldSpec, FieldType, RecordType, Severity, Value};
use intake_rules::{
    CacheConfig, FileContext, RowContext, Rule, RuleCache, RulePlan, RuleType, Violation,
    ViolationKind, evaluate,
};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).expect("date")
}

fn number(text: &str) -> Value {
    Value::Number(text.parse().expect("decimal"))
}

fn sales_schema() -> FieldSchema {
    FieldSchema::new(
        RecordType::Sales,
        vec![
            FieldSpec::required("transaction_id", FieldType::Text),
            FieldSpec::required("quantity", FieldType::Integer),
            FieldSpec::required("unit_price", FieldType::Decimal),
            FieldSpec::required("total_amount", FieldType::Decimal),
        ],
    )
}

fn sales_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "SALES_TOTAL",
            RecordType::Sales,
            RuleType::Comparison,
            "total_amount == quantity * unit_price",
            Severity::Critical,
        )
        .with_message("total {total_amount} does not match quantity x price"),
        Rule::new(
            "SALES_BIG_TICKET",
            RecordType::Sales,
            RuleType::Range,
            "total_amount < 100000",
            Severity::Warning,
        ),
        Rule::new(
            "SALES_ID_PREFIX",
            RecordType::Sales,
            RuleType::Business,
            "startswith(transaction_id, 'TXN-')",
            Severity::Info,
        ),
    ]
}

fn sales_row(total: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("transaction_id".to_string(), Value::Text("TXN-1".to_string())),
        ("quantity".to_string(), number("3")),
        ("unit_price".to_string(), number("99.99")),
        ("total_amount".to_string(), number(total)),
    ])
}

fn run(plan: &RulePlan, values: &BTreeMap<String, Value>) -> Vec<Violation> {
    let file = FileContext::new(as_of());
    let row = RowContext::new(1, plan.record_type, values);
    evaluate(&row, &file, plan)
}

#[test]
fn matching_sales_total_passes() {
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&sales_rules(), &sales_schema(), &cache);

    assert!(run(&plan, &sales_row("299.97")).is_empty());
}

#[test]
fn mismatched_sales_total_fails_fast() {
    let cache = RuleCache::new(CacheConfig::default());
    let mut rules = sales_rules();
    rules.push(Rule::new(
        "SALES_ALWAYS_WARN",
        RecordType::Sales,
        RuleType::Range,
        "quantity > 100",
        Severity::Warning,
    ));
    let plan = RulePlan::build(&rules, &sales_schema(), &cache);

    let violations = run(&plan, &sales_row("299.98"));
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.rule_id, "SALES_TOTAL");
    assert_eq!(violation.severity, Severity::Critical);
    assert_eq!(violation.kind, ViolationKind::Rule);
    assert_eq!(
        violation.message,
        "total 299.98 does not match quantity x price"
    );
}

#[test]
fn low_stock_is_informational() {
    let schema = FieldSchema::new(
        RecordType::Inventory,
        vec![
            FieldSpec::required("quantity_on_hand", FieldType::Integer),
            FieldSpec::required("reorder_level", FieldType::Integer),
        ],
    );
    let rules = vec![Rule::new(
        "INV_LOW_STOCK",
        RecordType::Inventory,
        RuleType::Comparison,
        "quantity_on_hand >= reorder_level",
        Severity::Info,
    )];
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&rules, &schema, &cache);
    let values = BTreeMap::from([
        ("quantity_on_hand".to_string(), number("5")),
        ("reorder_level".to_string(), number("10")),
    ]);

    let violations = run(&plan, &values);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Info);
    assert!(!violations.iter().any(|v| v.severity.invalidates_row()));
}

#[test]
fn expense_over_limit_is_critical() {
    let schema = FieldSchema::new(
        RecordType::Expense,
        vec![FieldSpec::required("amount", FieldType::Decimal)],
    );
    let rules = vec![Rule::new(
        "EXP_LIMIT",
        RecordType::Expense,
        RuleType::Range,
        "amount < 500000",
        Severity::Critical,
    )];
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&rules, &schema, &cache);
    let values = BTreeMap::from([("amount".to_string(), number("600000"))]);

    let violations = run(&plan, &values);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "EXP_LIMIT");
    assert!(violations[0].severity.invalidates_row());
}

#[test]
fn critical_rules_run_in_rule_id_order() {
    let schema = sales_schema();
    let rules = vec![
        Rule::new("Z_LAST", RecordType::Sales, RuleType::Range, "quantity > 10", Severity::Critical),
        Rule::new("A_FIRST", RecordType::Sales, RuleType::Range, "quantity > 5", Severity::Critical),
    ];
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&rules, &schema, &cache);

    let violations = run(&plan, &sales_row("299.97"));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "A_FIRST");
}

#[test]
fn duplicate_detection_is_scoped_to_one_file() {
    let schema = sales_schema();
    let rules = vec![Rule::new(
        "SALES_UNIQUE_TXN",
        RecordType::Sales,
        RuleType::Business,
        "unique(transaction_id)",
        Severity::Critical,
    )];
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&rules, &schema, &cache);
    assert!(plan.is_stateful());

    let values = sales_row("299.97");
    let first_file = FileContext::new(as_of());
    let row = RowContext::new(1, RecordType::Sales, &values);
    assert!(evaluate(&row, &first_file, &plan).is_empty());
    let repeat = RowContext::new(2, RecordType::Sales, &values);
    assert_eq!(evaluate(&repeat, &first_file, &plan).len(), 1);

    let second_file = FileContext::new(as_of());
    assert!(evaluate(&repeat, &second_file, &plan).is_empty());
}

#[test]
fn rules_for_other_record_types_are_reported() {
    let mut rules = sales_rules();
    rules.push(Rule::new(
        "EXP_LIMIT",
        RecordType::Expense,
        RuleType::Range,
        "amount < 500000",
        Severity::Critical,
    ));
    let cache = RuleCache::new(CacheConfig::default());
    let plan = RulePlan::build(&rules, &sales_schema(), &cache);

    assert_eq!(plan.len(), 3);
    assert_eq!(plan.warnings.len(), 1);
    assert_eq!(plan.warnings[0].code, "record_type_mismatch");
}
