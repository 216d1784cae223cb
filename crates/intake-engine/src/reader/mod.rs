//! Lazy, forward-only readers turning a source container into raw rows.

mod csv;
mod json;

use std::io::Read;

use intake_core::{RawRow, RawValue, parse_decimal};
use serde_json::Value as JsonValue;

use crate::errors::ReadError;
use crate::format::FileFormat;

pub use self::csv::CsvRows;
pub use self::json::{JsonArrayRows, JsonLinesRows};

/// One item of a row stream.
pub type RowResult = std::result::Result<RawRow, ReadError>;

/// Boxed row stream over any supported format.
pub type RowStream<'a> = Box<dyn Iterator<Item = RowResult> + 'a>;

/// Open a row stream for `format` over `reader`.
///
/// After a [`ReadError::File`] item the stream yields nothing more.
pub fn open_rows<'a, R: Read + 'a>(format: FileFormat, reader: R) -> RowStream<'a> {
    match format {
        FileFormat::Csv => Box::new(CsvRows::new(reader)),
        FileFormat::Json => Box::new(JsonArrayRows::new(reader)),
        FileFormat::JsonLines => Box::new(JsonLinesRows::new(reader)),
    }
}

/// Convert a JSON record into a raw row; non-objects are rejected.
pub(crate) fn row_from_json(index: u64, value: JsonValue) -> Result<RawRow, String> {
    let JsonValue::Object(map) = value else {
        return Err(format!("expected a JSON object, found {}", json_kind(&value)));
    };

    let mut row = RawRow::new(index);
    for (name, value) in map {
        row.fields.insert(name, raw_from_json(value));
    }
    Ok(row)
}

fn raw_from_json(value: JsonValue) -> RawValue {
    match value {
        JsonValue::Null => RawValue::Null,
        JsonValue::Bool(flag) => RawValue::Bool(flag),
        JsonValue::Number(number) => {
            let text = number.to_string();
            match parse_decimal(&text) {
                Some(decimal) => RawValue::Number(decimal),
                None => RawValue::Text(text),
            }
        }
        JsonValue::String(text) => RawValue::Text(text),
        nested => RawValue::Text(nested.to_string()),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
