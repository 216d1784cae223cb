use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::NaiveDate;
use intake_core::{RecordType, Value};

/// Typed values of one row, read-only during rule evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub row_index: u64,
    pub record_type: RecordType,
    pub values: &'a BTreeMap<String, Value>,
}

impl<'a> RowContext<'a> {
    pub fn new(row_index: u64, record_type: RecordType, values: &'a BTreeMap<String, Value>) -> Self {
        Self {
            row_index,
            record_type,
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.values.get(field)
    }
}

/// State shared by every row of one file.
///
/// Holds the processing date returned by `today()` and the seen-key set that
/// backs `unique()`. The set only grows while the file is processed.
#[derive(Debug)]
pub struct FileContext {
    as_of: NaiveDate,
    seen: Mutex<HashSet<String>>,
}

impl FileContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Record a value tuple for one `unique()` call site.
    ///
    /// Returns `true` when the tuple had not been seen before in this file.
    pub fn record_unique(&self, rule_id: &str, call_site: usize, values: &[&Value]) -> bool {
        let key = format!(
            "{}|{call_site}|{}",
            escape_key_component(rule_id),
            tuple_key(values)
        );
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.insert(key)
    }

    pub fn seen_keys(&self) -> usize {
        self.seen
            .lock()
            .map(|seen| seen.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

fn tuple_key(values: &[&Value]) -> String {
    values
        .iter()
        .map(|value| match value {
            // Escaped components never contain a backslash followed by `N`.
            Value::Null => "\\N".to_string(),
            other => escape_key_component(&other.to_csv()),
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn escape_key_component(value: &str) -> String {
    value.replace('\\', "\\\\").replace('|', "\\|")
}
