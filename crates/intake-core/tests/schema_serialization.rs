use intake_core::{
    ConstraintKind, FieldConstraint, FieldSchema, FieldSpec, FieldType, RecordType, Severity,
};

#[test]
fn serializes_field_schema_deterministically() {
    let schema = FieldSchema::new(
        RecordType::Expense,
        vec![
            FieldSpec::required("description", FieldType::Text).with(FieldConstraint::warning(
                ConstraintKind::MinLength { min: 10 },
            )),
        ],
    )
    .with_alias("desc", "description");

    let json = serde_json::to_string_pretty(&schema).expect("serialize schema");
    let expected = r#"{
  "record_type": "EXPENSE",
  "fields": [
    {
      "name": "description",
      "field_type": "text",
      "required": true,
      "constraints": [
        {
          "kind": "min_length",
          "min": 10,
          "severity": "WARNING"
        }
      ]
    }
  ],
  "aliases": {
    "desc": "description"
  }
}"#;
    assert_eq!(json, expected);
}

#[test]
fn constraint_severity_defaults_to_critical() {
    let json = r#"{"kind": "max_length", "max": 50}"#;
    let constraint: FieldConstraint = serde_json::from_str(json).expect("parse constraint");
    assert_eq!(constraint.severity, Severity::Critical);
    assert_eq!(constraint.kind, ConstraintKind::MaxLength { max: 50 });
}

#[test]
fn builtin_schema_round_trips_through_json() {
    let schema = RecordType::Sales.schema();
    let json = serde_json::to_string(&schema).expect("serialize schema");
    let parsed: FieldSchema = serde_json::from_str(&json).expect("parse schema");
    assert_eq!(
        parsed.field_names().collect::<Vec<_>>(),
        schema.field_names().collect::<Vec<_>>()
    );
    assert_eq!(parsed.canonical_name("qty"), "quantity");
}
