use std::io::Read;

use intake_core::{RawRow, RawValue};

use super::RowResult;
use crate::errors::{FileParseError, RowParseError};

/// CSV rows keyed by the header record.
///
/// Rows whose field count differs from the header, or which are not valid
/// UTF-8, become row errors; I/O failures end the stream.
pub struct CsvRows<R: Read> {
    reader: ::csv::Reader<R>,
    headers: Option<Vec<String>>,
    record: ::csv::StringRecord,
    next_index: u64,
    done: bool,
}

impl<R: Read> CsvRows<R> {
    pub fn new(reader: R) -> Self {
        let reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        Self {
            reader,
            headers: None,
            record: ::csv::StringRecord::new(),
            next_index: 1,
            done: false,
        }
    }

    fn file_error(&mut self, message: String) -> RowResult {
        self.done = true;
        Err(FileParseError {
            rows_read: self.next_index - 1,
            message,
        }
        .into())
    }

    fn read_headers(&mut self) -> Option<std::result::Result<(), RowResult>> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let headers = self
                    .record
                    .iter()
                    .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
                    .collect::<Vec<_>>();
                self.headers = Some(headers);
                Some(Ok(()))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => Some(Err(self.file_error(format!("unreadable header: {err}")))),
        }
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.headers.is_none() {
            if let Err(item) = self.read_headers()? {
                return Some(item);
            }
        }

        let result = self.reader.read_record(&mut self.record);
        match result {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let index = self.next_index;
                self.next_index += 1;
                let headers = self.headers.as_deref().unwrap_or_default();
                if self.record.len() != headers.len() {
                    return Some(Err(RowParseError {
                        row_index: index,
                        message: format!(
                            "expected {} field(s), found {}",
                            headers.len(),
                            self.record.len()
                        ),
                    }
                    .into()));
                }

                let mut row = RawRow::new(index);
                for (name, value) in headers.iter().zip(self.record.iter()) {
                    row.fields
                        .insert(name.clone(), RawValue::Text(value.to_string()));
                }
                Some(Ok(row))
            }
            Err(err) => match err.kind() {
                ::csv::ErrorKind::Utf8 { .. } => {
                    let index = self.next_index;
                    self.next_index += 1;
                    Some(Err(RowParseError {
                        row_index: index,
                        message: err.to_string(),
                    }
                    .into()))
                }
                _ => Some(self.file_error(err.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReadError;

    #[test]
    fn rows_are_keyed_by_header_and_indexed_from_one() {
        let data = "qty,price\n3,99.99\n4\n5,1.00\n";
        let rows = CsvRows::new(data.as_bytes()).collect::<Vec<_>>();

        assert_eq!(rows.len(), 3);
        let first = rows[0].as_ref().expect("first row");
        assert_eq!(first.index, 1);
        assert_eq!(first.get("price"), Some(&RawValue::Text("99.99".to_string())));
        assert!(matches!(
            &rows[1],
            Err(ReadError::Row(RowParseError { row_index: 2, .. }))
        ));
        assert_eq!(rows[2].as_ref().expect("third row").index, 3);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert_eq!(CsvRows::new("".as_bytes()).count(), 0);
        assert_eq!(CsvRows::new("a,b\n".as_bytes()).count(), 0);
    }

    #[test]
    fn invalid_utf8_is_a_row_error() {
        let mut data = b"name\nok\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        data.extend_from_slice(b"fine\n");
        let rows = CsvRows::new(data.as_slice()).collect::<Vec<_>>();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(&rows[1], Err(ReadError::Row(_))));
        assert_eq!(rows[2].as_ref().expect("row after bad bytes").index, 3);
    }
}
