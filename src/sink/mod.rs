//! Export sinks.
//!
//! A sink takes a finished result set and writes it to the results directory in
//! one of the supported formats:
//! - `json`: pretty-printed array of objects
//! - `xml`: `<root>` with one `<entry>` per record and one child per field

pub mod json;
pub mod xml;

use crate::error::SinkError;
use crate::models::Record;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory exports land in unless configured otherwise.
pub const DEFAULT_RESULTS_DIR: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Xml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = SinkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(SinkError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Destination for exported result sets.
pub trait Sink {
    /// Write `records` under `name`. Returns the written path, or `None` when
    /// nothing was written (empty input or an unsupported format).
    fn write(&self, records: &[Record], name: &str, format: &str)
    -> Result<Option<PathBuf>, SinkError>;
}

/// Writes one file per export into a results directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    results_dir: PathBuf,
}

impl FileSink {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn encode(
        records: &[Record],
        format: OutputFormat,
        writer: &mut impl Write,
    ) -> Result<(), SinkError> {
        match format {
            OutputFormat::Json => json::write_records(records, writer),
            OutputFormat::Xml => xml::write_records(records, writer),
        }
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_DIR)
    }
}

impl Sink for FileSink {
    fn write(
        &self,
        records: &[Record],
        name: &str,
        format: &str,
    ) -> Result<Option<PathBuf>, SinkError> {
        let format = match OutputFormat::from_str(format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("skipping export '{}': {}", name, err);
                return Ok(None);
            }
        };

        if records.is_empty() {
            log::info!("skipping export '{}': no records", name);
            return Ok(None);
        }

        fs::create_dir_all(&self.results_dir)?;
        let path = self
            .results_dir
            .join(format!("{}.{}", name, format.extension()));

        let mut writer = BufWriter::new(File::create(&path)?);
        Self::encode(records, format, &mut writer)?;
        writer.flush()?;

        log::info!("wrote {} records to {}", records.len(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        vec![
            json!({"room_id": 1, "room_name": "Room #1", "student_count": 2}),
            json!({"room_id": 2, "room_name": "Room #2", "student_count": 0}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().expect("object"))
        .collect()
    }

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().ok(), Some(OutputFormat::Json));
        assert_eq!(" xml ".parse::<OutputFormat>().ok(), Some(OutputFormat::Xml));
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(SinkError::UnsupportedFormat(f)) if f == "yaml"
        ));
    }

    #[test]
    fn creates_results_directory_on_demand() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path().join("nested").join("results"));

        let path = sink
            .write(&sample(), "rooms_with_student_count", "json")
            .expect("write succeeds")
            .expect("file written");

        assert_eq!(
            path,
            sink.results_dir().join("rooms_with_student_count.json")
        );
        assert!(path.exists());
    }

    #[test]
    fn json_export_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());
        let records = sample();

        let path = sink
            .write(&records, "counts", "json")
            .expect("write succeeds")
            .expect("file written");

        let text = fs::read_to_string(path).expect("readable");
        let parsed: Vec<Record> = serde_json::from_str(&text).expect("valid json");
        assert_eq!(parsed, records);
        let keys: Vec<&str> = parsed[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["room_id", "room_name", "student_count"]);
    }

    #[test]
    fn xml_export_round_trips_as_strings() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        let path = sink
            .write(&sample(), "counts", "xml")
            .expect("write succeeds")
            .expect("file written");

        let text = fs::read_to_string(path).expect("readable");
        assert!(text.starts_with("<?xml"));
        let entries = xml::read_entries(&text).expect("parseable xml");
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            vec![
                ("room_id".to_string(), "2".to_string()),
                ("room_name".to_string(), "Room #2".to_string()),
                ("student_count".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn unsupported_format_writes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path().join("results"));

        let written = sink.write(&sample(), "counts", "csv").expect("not an error");
        assert!(written.is_none());
        assert!(!sink.results_dir().exists());
    }

    #[test]
    fn empty_result_writes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        let written = sink.write(&[], "counts", "json").expect("not an error");
        assert!(written.is_none());
        assert!(!dir.path().join("counts.json").exists());
    }
}
