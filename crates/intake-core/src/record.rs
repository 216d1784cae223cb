use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::builtin;
use crate::error::Error;
use crate::schema::FieldSchema;

/// Category of incoming data. Each variant owns a field schema, a rule-set key
/// and a warehouse target table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Sales,
    Inventory,
    Expense,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [RecordType::Sales, RecordType::Inventory, RecordType::Expense];

    /// Key under which the rule repository stores this type's rules.
    pub fn rule_set_key(&self) -> &'static str {
        match self {
            RecordType::Sales => "SALES",
            RecordType::Inventory => "INVENTORY",
            RecordType::Expense => "EXPENSE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RecordType::Sales => "sales",
            RecordType::Inventory => "inventory",
            RecordType::Expense => "expense",
        }
    }

    /// Warehouse table receiving rows that passed validation.
    pub fn table_name(&self) -> String {
        format!("{}_reports", self.display_name())
    }

    /// Object-store prefix files of this type arrive under.
    pub fn source_prefix(&self) -> &'static str {
        match self {
            RecordType::Sales => "Reports/Sales/",
            RecordType::Inventory => "Reports/Inventory/",
            RecordType::Expense => "Reports/Expense/",
        }
    }

    /// Resolve the record type from an object key such as `Reports/Sales/2024-05-01.csv`.
    pub fn from_source_key(key: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|record_type| key.contains(record_type.source_prefix()))
            .ok_or_else(|| Error::UnknownRecordType(key.to_string()))
    }

    /// Built-in field schema for this record type.
    pub fn schema(&self) -> FieldSchema {
        match self {
            RecordType::Sales => builtin::sales_schema(),
            RecordType::Inventory => builtin::inventory_schema(),
            RecordType::Expense => builtin::expense_schema(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule_set_key())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SALES" => Ok(RecordType::Sales),
            "INVENTORY" => Ok(RecordType::Inventory),
            "EXPENSE" => Ok(RecordType::Expense),
            _ => Err(Error::UnknownRecordType(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_record_type_from_source_key() {
        let record_type = RecordType::from_source_key("uploads/Reports/Inventory/day1.csv")
            .expect("inventory key");
        assert_eq!(record_type, RecordType::Inventory);
        assert!(RecordType::from_source_key("Reports/Payroll/x.csv").is_err());
    }

    #[test]
    fn parses_record_type_case_insensitively() {
        assert_eq!("sales".parse::<RecordType>().ok(), Some(RecordType::Sales));
        assert_eq!(RecordType::Expense.table_name(), "expense_reports");
    }
}
