//! Streaming reader for JSON files holding a top-level array of objects.
//!
//! Elements are decoded one at a time straight from a buffered file handle, so
//! memory use is bounded by the largest single record rather than the file size.

use crate::error::SourceError;
use crate::models::Record;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Lazy, single-pass sequence of records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record, SourceError>>>;

/// Something that can produce records from a file path.
///
/// Each call to `stream` starts over from the beginning of the file.
pub trait RecordSource {
    fn stream(&self, path: &Path) -> Result<RecordStream, SourceError>;
}

/// Reads `[ {...}, {...}, ... ]` documents incrementally.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArraySource;

impl RecordSource for JsonArraySource {
    fn stream(&self, path: &Path) -> Result<RecordStream, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("streaming records from {}", path.display());
        Ok(Box::new(JsonArrayReader::new(BufReader::new(file))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    First,
    Next,
    Done,
}

/// Iterator over the elements of a JSON array read from `R`.
pub struct JsonArrayReader<R> {
    reader: R,
    state: State,
    index: usize,
}

impl<R: BufRead> JsonArrayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            index: 0,
        }
    }

    /// Skip whitespace and return the next significant byte without consuming it.
    fn peek_significant(&mut self) -> Result<Option<u8>, SourceError> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if skip < buf.len() {
                let byte = buf[skip];
                self.reader.consume(skip);
                return Ok(Some(byte));
            }
            let len = buf.len();
            self.reader.consume(len);
        }
    }

    fn expect_open(&mut self) -> Result<(), SourceError> {
        match self.peek_significant()? {
            Some(b'[') => {
                self.reader.consume(1);
                Ok(())
            }
            Some(other) => Err(SourceError::malformed(
                0,
                format!("expected '[' but found '{}'", other as char),
            )),
            None => Err(SourceError::malformed(0, "empty input")),
        }
    }

    /// Consume the separator before the next element. Returns false at the closing bracket.
    fn advance(&mut self) -> Result<bool, SourceError> {
        match (self.state, self.peek_significant()?) {
            (_, Some(b']')) => {
                self.reader.consume(1);
                match self.peek_significant()? {
                    Some(_) => Err(SourceError::malformed(
                        self.index,
                        "trailing characters after array",
                    )),
                    None => Ok(false),
                }
            }
            (State::First, Some(_)) => Ok(true),
            (State::Next, Some(b',')) => {
                self.reader.consume(1);
                Ok(true)
            }
            (_, Some(other)) => Err(SourceError::malformed(
                self.index,
                format!("expected ',' or ']' but found '{}'", other as char),
            )),
            (_, None) => Err(SourceError::malformed(self.index, "unexpected end of input")),
        }
    }

    fn read_element(&mut self) -> Result<Record, SourceError> {
        let index = self.index;
        let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
        let value = Value::deserialize(&mut de)
            .map_err(|err| SourceError::malformed(index, err.to_string()))?;
        match value {
            Value::Object(record) => Ok(record),
            _ => Err(SourceError::NotAnObject { index }),
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        if self.state == State::Start {
            self.expect_open()?;
            self.state = State::First;
        }

        if !self.advance()? {
            self.state = State::Done;
            return Ok(None);
        }

        let record = self.read_element()?;
        self.state = State::Next;
        self.index += 1;
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for JsonArrayReader<R> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }

        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn read_all(input: &str) -> Vec<Result<Record, SourceError>> {
        JsonArrayReader::new(Cursor::new(input.as_bytes().to_vec())).collect()
    }

    #[test]
    fn yields_objects_in_file_order() {
        let records = read_all(
            r#"  [
                {"id": 0, "name": "Room #0"},
                {"id": 1, "name": "Room #1"} ,
                {"id": 2, "name": "Room #2"}
            ]"#,
        );
        let ids: Vec<i64> = records
            .into_iter()
            .map(|r| r.expect("valid record")["id"].as_i64().expect("numeric id"))
            .collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn empty_array_yields_nothing() {
        assert!(read_all("[]").is_empty());
        assert!(read_all(" [ \n ] ").is_empty());
    }

    #[test]
    fn non_array_document_is_malformed() {
        let records = read_all(r#"{"id": 1}"#);
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(SourceError::Malformed { .. })));
    }

    #[test]
    fn scalar_element_is_rejected_and_stream_stops() {
        let records = read_all(r#"[{"id": 1}, 42, {"id": 3}]"#);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(SourceError::NotAnObject { index: 1 })));
    }

    #[test]
    fn truncated_input_reports_error() {
        let records = read_all(r#"[{"id": 1}, {"id": 2"#);
        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Err(SourceError::Malformed { index: 1, .. })));
    }

    #[test]
    fn missing_separator_reports_error() {
        let records = read_all(r#"[{"id": 1} {"id": 2}]"#);
        assert!(matches!(records[1], Err(SourceError::Malformed { index: 1, .. })));
    }

    #[test]
    fn trailing_data_after_array_is_malformed() {
        let records = read_all(r#"[{"id": 1, "name": "A"}] this is not json"#);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(SourceError::Malformed { index: 1, .. })));

        let padded = read_all("[{\"id\": 1}] \n\t ");
        assert_eq!(padded.len(), 1);
        assert!(padded[0].is_ok());
    }

    #[test]
    fn stream_restarts_on_each_call() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"[{{"id": 1, "name": "A"}}, {{"id": 2, "name": "B"}}]"#).expect("write");

        let source = JsonArraySource;
        let first: Vec<_> = source.stream(file.path()).expect("open").collect();
        let second: Vec<_> = source.stream(file.path()).expect("open").collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = JsonArraySource.stream(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}
