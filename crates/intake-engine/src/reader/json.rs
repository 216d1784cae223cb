use std::io::{BufRead, BufReader, Bytes, Read};
use std::iter::Peekable;

use serde_json::Value as JsonValue;

use super::{RowResult, row_from_json};
use crate::errors::{FileParseError, RowParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    Start,
    InArray { first: bool },
    Closed,
    Done,
}

/// Records of a top-level JSON array, scanned one element at a time.
///
/// A document holding a single object is read as one record. Elements that
/// are not valid JSON objects become row errors as long as the array itself
/// stays well formed. Only whitespace may follow the closing bracket.
pub struct JsonArrayRows<R: Read> {
    bytes: Peekable<Bytes<BufReader<R>>>,
    state: ArrayState,
    next_index: u64,
    element: Vec<u8>,
}

impl<R: Read> JsonArrayRows<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes().peekable(),
            state: ArrayState::Start,
            next_index: 1,
            element: Vec::new(),
        }
    }

    fn file_error(&mut self, message: impl Into<String>) -> RowResult {
        self.state = ArrayState::Done;
        Err(FileParseError {
            rows_read: self.next_index - 1,
            message: message.into(),
        }
        .into())
    }

    fn next_byte(&mut self) -> Option<std::io::Result<u8>> {
        self.bytes.next()
    }

    /// Next non-whitespace byte, `Ok(None)` at end of input.
    fn skip_whitespace(&mut self) -> std::io::Result<Option<u8>> {
        loop {
            match self.next_byte() {
                Some(Ok(byte)) if byte.is_ascii_whitespace() => continue,
                Some(Ok(byte)) => return Ok(Some(byte)),
                Some(Err(err)) => return Err(err),
                None => return Ok(None),
            }
        }
    }

    fn start(&mut self) -> Option<RowResult> {
        match self.skip_whitespace() {
            Ok(Some(b'[')) => {
                self.state = ArrayState::InArray { first: true };
                self.next()
            }
            Ok(Some(b'{')) => Some(self.single_object()),
            Ok(Some(other)) => Some(self.file_error(format!(
                "expected a JSON array or object, found `{}`",
                char::from(other)
            ))),
            Ok(None) => Some(self.file_error("empty JSON document")),
            Err(err) => Some(self.file_error(err.to_string())),
        }
    }

    fn single_object(&mut self) -> RowResult {
        let mut document = vec![b'{'];
        while let Some(byte) = self.next_byte() {
            match byte {
                Ok(byte) => document.push(byte),
                Err(err) => return self.file_error(err.to_string()),
            }
        }
        self.state = ArrayState::Done;
        match serde_json::from_slice::<JsonValue>(&document) {
            Ok(value) => {
                let index = self.next_index;
                self.next_index += 1;
                row_from_json(index, value).map_err(|message| {
                    RowParseError {
                        row_index: index,
                        message,
                    }
                    .into()
                })
            }
            Err(err) => self.file_error(err.to_string()),
        }
    }

    /// Copy one array element into `self.element`, returning the terminator.
    fn capture_element(&mut self) -> std::io::Result<Option<u8>> {
        self.element.clear();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let byte = match self.next_byte() {
                Some(Ok(byte)) => byte,
                Some(Err(err)) => return Err(err),
                None => return Ok(None),
            };

            if in_string {
                self.element.push(byte);
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b',' | b']' if depth == 0 => return Ok(Some(byte)),
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.element.push(byte);
        }
    }
}

impl<R: Read> Iterator for JsonArrayRows<R> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.state {
            ArrayState::Done => return None,
            ArrayState::Start => return self.start(),
            ArrayState::Closed => return self.trailing(),
            ArrayState::InArray { first } => first,
        };

        if first {
            match self.bytes.peek() {
                Some(Ok(byte)) if byte.is_ascii_whitespace() => {
                    if let Err(err) = self.skip_leading_whitespace() {
                        return Some(self.file_error(err.to_string()));
                    }
                }
                _ => {}
            }
            if matches!(self.bytes.peek(), Some(Ok(b']'))) {
                self.bytes.next();
                return self.trailing();
            }
        }

        let terminator = match self.capture_element() {
            Ok(Some(terminator)) => terminator,
            Ok(None) => return Some(self.file_error("unexpected end of JSON array")),
            Err(err) => return Some(self.file_error(err.to_string())),
        };
        if self.element.iter().all(u8::is_ascii_whitespace) {
            return Some(self.file_error(format!(
                "empty element after row {} in JSON array",
                self.next_index - 1
            )));
        }

        self.state = if terminator == b']' {
            ArrayState::Closed
        } else {
            ArrayState::InArray { first: false }
        };

        let index = self.next_index;
        self.next_index += 1;
        let parsed = serde_json::from_slice::<JsonValue>(&self.element)
            .map_err(|err| err.to_string())
            .and_then(|value| row_from_json(index, value));
        Some(parsed.map_err(|message| {
            RowParseError {
                row_index: index,
                message,
            }
            .into()
        }))
    }
}

impl<R: Read> JsonArrayRows<R> {
    fn trailing(&mut self) -> Option<RowResult> {
        match self.skip_whitespace() {
            Ok(None) => {
                self.state = ArrayState::Done;
                None
            }
            Ok(Some(byte)) => Some(self.file_error(format!(
                "unexpected `{}` after the closing bracket of the JSON array",
                char::from(byte)
            ))),
            Err(err) => Some(self.file_error(err.to_string())),
        }
    }

    fn skip_leading_whitespace(&mut self) -> std::io::Result<()> {
        while let Some(Ok(byte)) = self.bytes.peek() {
            if !byte.is_ascii_whitespace() {
                break;
            }
            self.bytes.next();
        }
        if matches!(self.bytes.peek(), Some(Err(_))) {
            if let Some(Err(err)) = self.bytes.next() {
                return Err(err);
            }
        }
        Ok(())
    }
}

/// One JSON record per line; blank lines are skipped.
pub struct JsonLinesRows<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    next_index: u64,
    done: bool,
}

impl<R: Read> JsonLinesRows<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            next_index: 1,
            done: false,
        }
    }
}

impl<R: Read> Iterator for JsonLinesRows<R> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    if self.line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let index = self.next_index;
                    self.next_index += 1;
                    let parsed = serde_json::from_slice::<JsonValue>(&self.line)
                        .map_err(|err| err.to_string())
                        .and_then(|value| row_from_json(index, value));
                    return Some(parsed.map_err(|message| {
                        RowParseError {
                            row_index: index,
                            message,
                        }
                        .into()
                    }));
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(FileParseError {
                        rows_read: self.next_index - 1,
                        message: err.to_string(),
                    }
                    .into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use intake_core::RawValue;
    use rust_decimal::Decimal;

    use super::*;
    use crate::errors::ReadError;

    #[test]
    fn array_elements_are_read_lazily_in_order() {
        let data = r#" [ {"id": "a", "qty": 3, "note": "x, ]"}, {"id": "b", "tags": [1, 2]} ] "#;
        let rows = JsonArrayRows::new(data.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].get("qty"), Some(&RawValue::Number(Decimal::from(3))));
        assert_eq!(rows[0].get("note"), Some(&RawValue::Text("x, ]".to_string())));
        assert_eq!(rows[1].get("tags"), Some(&RawValue::Text("[1,2]".to_string())));
    }

    #[test]
    fn single_object_is_one_record() {
        let rows = JsonArrayRows::new(r#"{"id": "only"}"#.as_bytes()).collect::<Vec<_>>();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().expect("row").index, 1);
    }

    #[test]
    fn bad_elements_are_row_errors_but_truncation_is_fatal() {
        let rows = JsonArrayRows::new(r#"[{"id": 1}, 42, {"id": tru}, {"id": 2}"#.as_bytes())
            .collect::<Vec<_>>();

        assert!(rows[0].is_ok());
        assert!(matches!(&rows[1], Err(ReadError::Row(RowParseError { row_index: 2, .. }))));
        assert!(matches!(&rows[2], Err(ReadError::Row(RowParseError { row_index: 3, .. }))));
        assert!(matches!(
            &rows[3],
            Err(ReadError::File(FileParseError { rows_read: 3, .. }))
        ));
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn empty_array_has_no_rows() {
        assert_eq!(JsonArrayRows::new(" [ ] \n".as_bytes()).count(), 0);
    }

    #[test]
    fn content_after_the_array_is_fatal() {
        let rows = JsonArrayRows::new(r#"[{"id": 1}] {"trailing": tru"#.as_bytes())
            .collect::<Vec<_>>();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        assert!(matches!(
            &rows[1],
            Err(ReadError::File(FileParseError { rows_read: 1, .. }))
        ));

        let rows = JsonArrayRows::new("[] x".as_bytes()).collect::<Vec<_>>();
        assert!(matches!(
            rows.as_slice(),
            [Err(ReadError::File(FileParseError { rows_read: 0, .. }))]
        ));
    }

    #[test]
    fn json_lines_skip_blank_lines() {
        let data = "{\"id\": 1}\n\n{broken\n{\"id\": 3}";
        let rows = JsonLinesRows::new(data.as_bytes()).collect::<Vec<_>>();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(&rows[1], Err(ReadError::Row(RowParseError { row_index: 2, .. }))));
        assert_eq!(rows[2].as_ref().expect("row").index, 3);
    }
}
