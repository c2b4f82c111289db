//! Error types for arrowsink

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for arrowsink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for arrowsink
#[derive(Debug)]
pub enum Error {
    /// Arrow-related errors
    Arrow(arrow_schema::ArrowError),
    /// Parquet-related errors
    Parquet(parquet::errors::ParquetError),
    /// IO errors
    Io(std::io::Error),
    /// Malformed IPC framing or an inconsistent-schema write
    Protocol(String),
    /// Structurally invalid schema, or a mismatch against an expected schema
    SchemaValidation(String),
    /// Backpressure timeout exceeded on enqueue
    BufferOverflow { timeout: Duration },
    /// Enqueue attempted on a closed buffer
    BufferClosed,
    /// Dequeue timed out on an empty, open buffer
    Timeout,
    /// Snappy or protobuf failure on a remote-write payload
    WireDecode(String),
    /// Decodable but semantically invalid remote-write request
    WireValidation(String),
    /// Orchestration-level failure during an ingestion run
    Streaming(String),
    /// Source batch stream missing at ingestion start
    NotFound(PathBuf),
    /// A write was asked to produce a stream from zero batches
    NoBatches,
    /// No files have been written for the named dataset
    DatasetNotFound(String),
    /// Catalog registration failure
    Catalog(String),
    /// Configuration errors
    Config(String),
    /// Internal error
    Internal(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by
    /// this process or its storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::SchemaValidation(_)
                | Error::WireDecode(_)
                | Error::WireValidation(_)
                | Error::NotFound(_)
                | Error::NoBatches
                | Error::DatasetNotFound(_)
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arrow(e) => Some(e),
            Error::Parquet(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arrow(e) => write!(f, "Arrow error: {}", e),
            Error::Parquet(e) => write!(f, "Parquet error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::SchemaValidation(msg) => write!(f, "Schema validation failed: {}", msg),
            Error::BufferOverflow { timeout } => {
                write!(f, "Buffer full, timeout expired after {:?}", timeout)
            }
            Error::BufferClosed => write!(f, "Buffer is closed"),
            Error::Timeout => write!(f, "Buffer empty, timeout expired"),
            Error::WireDecode(msg) => write!(f, "Remote write decode error: {}", msg),
            Error::WireValidation(msg) => write!(f, "Invalid remote write request: {}", msg),
            Error::Streaming(msg) => write!(f, "Ingestion failed: {}", msg),
            Error::NotFound(path) => write!(f, "IPC stream file not found: {}", path.display()),
            Error::NoBatches => write!(f, "No batches to write"),
            Error::DatasetNotFound(name) => write!(f, "Dataset {} not found", name),
            Error::Catalog(msg) => write!(f, "Catalog error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<arrow_schema::ArrowError> for Error {
    fn from(e: arrow_schema::ArrowError) -> Self {
        Error::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Parquet(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::WireDecode(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", e))
    }
}
