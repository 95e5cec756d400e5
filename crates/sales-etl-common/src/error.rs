//! Error types for the sales ETL pipeline
//!
//! Per-line problems are not represented here: a malformed record is skipped
//! by the stage that read it. Everything in [`EtlError`] aborts the run and is
//! reported back to the caller as a structured error.

use thiserror::Error;

/// Boxed source error from an external collaborator (S3 SDK, sqlx, ...).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Run-level error taxonomy
#[derive(Error, Debug)]
pub enum EtlError {
    /// The source object does not exist or could not be opened.
    #[error("Source object s3://{bucket}/{key} not found or inaccessible: {source}")]
    SourceNotFound {
        bucket: String,
        key: String,
        source: BoxError,
    },

    /// The source stream failed part-way through.
    #[error("Failed reading s3://{bucket}/{key}: {source}")]
    SourceRead {
        bucket: String,
        key: String,
        source: BoxError,
    },

    /// Uploading the cleaned output failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    SinkWriteError {
        bucket: String,
        key: String,
        source: BoxError,
    },

    /// The relational sink could not be reached.
    #[error("Database connection failed: {0}")]
    ConnectionError(#[source] BoxError),

    /// Creating the target table failed.
    #[error("Failed to prepare table: {0}")]
    SchemaError(#[source] BoxError),

    /// A bulk insert was rejected by the sink.
    #[error("Batch insert of {rows} rows failed: {source}")]
    BatchExecutionError { rows: usize, source: BoxError },

    /// Committing a batch failed.
    #[error("Commit failed: {0}")]
    CommitError(#[source] BoxError),

    /// A read-only summary query failed.
    #[error("Query failed: {0}")]
    Query(#[source] BoxError),

    /// The invocation payload is missing required keys.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV encoding error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EtlError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::SourceNotFound { .. } => "SourceNotFound",
            EtlError::SourceRead { .. } => "SourceRead",
            EtlError::SinkWriteError { .. } => "SinkWriteError",
            EtlError::ConnectionError(_) => "ConnectionError",
            EtlError::SchemaError(_) => "SchemaError",
            EtlError::BatchExecutionError { .. } => "BatchExecutionError",
            EtlError::CommitError(_) => "CommitError",
            EtlError::Query(_) => "Query",
            EtlError::InvalidRequest(_) => "InvalidRequest",
            EtlError::Config(_) => "Config",
            EtlError::Encode(_) => "Encode",
            EtlError::Io(_) => "Io",
            EtlError::Serialization(_) => "Serialization",
        }
    }
}
