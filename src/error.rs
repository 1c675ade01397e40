use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading an input file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed input at element {index}: {message}")]
    Malformed { index: usize, message: String },
    #[error("element {index} is not a JSON object")]
    NotAnObject { index: usize },
}

impl SourceError {
    pub fn malformed(index: usize, message: impl Into<String>) -> Self {
        SourceError::Malformed {
            index,
            message: message.into(),
        }
    }
}

/// A single record that could not be mapped into a room or a student.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid record: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("unparseable birthday '{0}'")]
    Birthday(String),
    #[error("name must not be empty")]
    EmptyName,
}

/// Failures while writing an export.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unsupported output format '{0}'")]
    UnsupportedFormat(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xml encoding error: {0}")]
    Xml(String),
}

/// Failures inside the storage engine. These never leave the engine boundary;
/// they are logged and turned into an absent result.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    Connection(sqlx::Error),
    #[error("store is not connected")]
    NotConnected,
    #[error("database error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),
}
