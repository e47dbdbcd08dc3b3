// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a raw store document into an [`EventRecord`].
///
/// These are always recovered per record: the scan logs and skips.
///
/// [`EventRecord`]: crate::types::EventRecord
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("document has no dtime field")]
    MissingTimestamp,

    #[error("unparseable dtime value: {raw}")]
    BadTimestamp { raw: String },

    #[error("document is not a JSON object")]
    NotAnObject,
}

/// Structural problems in a rollup artifact (missing keys, misaligned series).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("missing key: {key}")]
    MissingKey { key: String },

    #[error("key {key} has the wrong type: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("series {key} has {actual} entries, expected {expected}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("count at {key}[{position}] is not a non-negative integer")]
    BadCount { key: String, position: usize },

    #[error("value {key:?} collides with its table's index key")]
    ReservedValue { key: String },

    #[error("counts in series {key} overflow when summed")]
    CountOverflow { key: String },

    #[error("date label {label:?} cannot be truncated to {granularity}")]
    BadDateLabel { label: String, granularity: &'static str },

    #[error("cannot re-aggregate {from} data into finer {to} buckets")]
    FinerTarget {
        from: &'static str,
        to: &'static str,
    },
}

impl ShapeError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }
}

/// Errors reading or writing artifact files on disk.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid station identifier: {station:?}")]
    InvalidStation { station: String },

    #[error("Malformed artifact {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ArtifactError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Invalid value for {var}: {value:?}")]
    BadEnv { var: &'static str, value: String },

    #[error("Config value {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}
