//! Built-in field schemas for the shipped record types.

use rust_decimal::Decimal;

use crate::record::RecordType;
use crate::schema::{ConstraintKind, FieldConstraint, FieldSchema, FieldSpec};
use crate::types::FieldType;

fn max_length(max: usize) -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::MaxLength { max })
}

fn positive() -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::Min {
        value: Decimal::ZERO,
        exclusive: true,
    })
}

fn non_negative() -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::Min {
        value: Decimal::ZERO,
        exclusive: false,
    })
}

fn pattern(regex: &str, message: &str) -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::Pattern {
        regex: regex.to_string(),
    })
    .with_message(message)
}

fn one_of(values: &[&str]) -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::OneOf {
        values: values.iter().map(|value| value.to_string()).collect(),
    })
}

fn not_in_future() -> FieldConstraint {
    FieldConstraint::critical(ConstraintKind::NotInFuture)
}

pub fn sales_schema() -> FieldSchema {
    FieldSchema::new(
        RecordType::Sales,
        vec![
            FieldSpec::required("transaction_id", FieldType::Text)
                .with(max_length(50))
                .with(pattern(
                    r"^TXN-\d{11}$",
                    "transaction_id must follow format TXN-YYYYMMDDNNN",
                )),
            FieldSpec::required("date", FieldType::Date).with(not_in_future()),
            FieldSpec::required("customer_id", FieldType::Text).with(max_length(50)),
            FieldSpec::required("item_id", FieldType::Text).with(max_length(50)),
            FieldSpec::required("quantity", FieldType::Integer).with(positive()),
            FieldSpec::required("unit_price", FieldType::Decimal).with(positive()),
            FieldSpec::required("total_amount", FieldType::Decimal).with(positive()),
            FieldSpec::required("payment_method", FieldType::Text)
                .with(one_of(&["CASH", "CARD", "E-WALLET"])),
        ],
    )
    .with_alias("txn_id", "transaction_id")
    .with_alias("trans_id", "transaction_id")
    .with_alias("cust_id", "customer_id")
    .with_alias("product_id", "item_id")
    .with_alias("qty", "quantity")
    .with_alias("price", "unit_price")
    .with_alias("total", "total_amount")
    .with_alias("payment", "payment_method")
}

pub fn inventory_schema() -> FieldSchema {
    FieldSchema::new(
        RecordType::Inventory,
        vec![
            FieldSpec::required("item_id", FieldType::Text)
                .with(max_length(50))
                .with(pattern(
                    r"^ITEM-\d{3,}$",
                    "item_id must follow format ITEM-NNN (minimum 3 digits)",
                )),
            FieldSpec::required("item_name", FieldType::Text).with(max_length(255)),
            FieldSpec::required("category", FieldType::Text).with(one_of(&[
                "AUTO_PARTS",
                "ELECTRONICS",
                "FOOD",
                "CLOTHING",
                "MISC",
            ])),
            FieldSpec::required("quantity_on_hand", FieldType::Integer).with(non_negative()),
            FieldSpec::required("reorder_level", FieldType::Integer).with(non_negative()),
            FieldSpec::required("last_updated", FieldType::Timestamp).with(not_in_future()),
            FieldSpec::optional("cost_price", FieldType::Decimal).with(non_negative()),
            FieldSpec::optional("status", FieldType::Text)
                .with(one_of(&["ACTIVE", "DISCONTINUED"])),
        ],
    )
    .with_alias("id", "item_id")
    .with_alias("product_id", "item_id")
    .with_alias("name", "item_name")
    .with_alias("product_name", "item_name")
    .with_alias("type", "category")
    .with_alias("stock", "quantity_on_hand")
    .with_alias("qty", "quantity_on_hand")
    .with_alias("min_stock", "reorder_level")
    .with_alias("reorder_point", "reorder_level")
    .with_alias("updated", "last_updated")
    .with_alias("timestamp", "last_updated")
    .with_alias("price", "cost_price")
    .with_alias("unit_cost", "cost_price")
}

pub fn expense_schema() -> FieldSchema {
    FieldSchema::new(
        RecordType::Expense,
        vec![
            FieldSpec::required("expense_id", FieldType::Text)
                .with(max_length(50))
                .with(pattern(
                    r"^EXP-\d{8}-\d{3}$",
                    "expense_id must follow format EXP-YYYYMMDD-NNN",
                )),
            FieldSpec::required("date", FieldType::Date).with(not_in_future()),
            FieldSpec::required("category", FieldType::Text).with(one_of(&[
                "SUPPLIES",
                "UTILITIES",
                "RENT",
                "SALARY",
                "MISC",
            ])),
            FieldSpec::required("amount", FieldType::Decimal).with(positive()),
            FieldSpec::required("description", FieldType::Text)
                .with(max_length(500))
                .with(
                    FieldConstraint::warning(ConstraintKind::MinLength { min: 10 })
                        .with_message("description should be at least 10 characters"),
                ),
            FieldSpec::required("approved_by", FieldType::Text).with(max_length(50)),
            FieldSpec::optional("justification", FieldType::Text).with(max_length(500)),
        ],
    )
    .with_alias("exp_id", "expense_id")
    .with_alias("expense_type", "category")
    .with_alias("cost", "amount")
    .with_alias("total", "amount")
    .with_alias("desc", "description")
    .with_alias("approver", "approved_by")
    .with_alias("approved_by_id", "approved_by")
    .with_alias("reason", "justification")
}
