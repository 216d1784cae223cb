use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::RuleSet;

/// Emit the JSON Schema for `rules.json`.
pub fn rule_set_json_schema() -> RootSchema {
    schema_for!(RuleSet)
}
