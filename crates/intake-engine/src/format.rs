use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Supported source containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Comma separated values with a header row.
    Csv,
    /// A JSON array of records, or a single record object.
    Json,
    /// One JSON record per line.
    JsonLines,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::JsonLines => "jsonl",
        }
    }

    /// Pick the format from a declared content type, falling back to the extension.
    pub fn detect(source: &str, content_type: Option<&str>) -> Result<Self> {
        if let Some(format) = content_type.and_then(Self::from_content_type) {
            return Ok(format);
        }
        if let Some(format) = Self::from_extension(source) {
            return Ok(format);
        }
        Err(EngineError::UnsupportedFormat(match content_type {
            Some(content_type) => format!("{source} ({content_type})"),
            None => source.to_string(),
        }))
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" => Some(FileFormat::Csv),
            "application/json" | "text/json" => Some(FileFormat::Json),
            "application/x-ndjson" | "application/jsonl" | "application/x-jsonlines"
            | "application/jsonlines" => Some(FileFormat::JsonLines),
            _ => None,
        }
    }

    pub fn from_extension(source: &str) -> Option<Self> {
        let extension = Path::new(source)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "json" => Some(FileFormat::Json),
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_takes_precedence() {
        assert_eq!(
            FileFormat::detect("Reports/Sales/day.csv", Some("application/json; charset=utf-8"))
                .expect("format"),
            FileFormat::Json
        );
        assert_eq!(
            FileFormat::detect("Reports/Sales/day.NDJSON", Some("binary/octet-stream"))
                .expect("format"),
            FileFormat::JsonLines
        );
    }

    #[test]
    fn unknown_formats_fail() {
        assert!(matches!(
            FileFormat::detect("Reports/Sales/day.xlsx", None),
            Err(EngineError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::detect("Reports/Sales/day", Some("text/plain")),
            Err(EngineError::UnsupportedFormat(_))
        ));
    }
}
