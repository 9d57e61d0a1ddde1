//! Error types for pgdata

use thiserror::Error;

/// Core error type for pgdata operations
#[derive(Error, Debug)]
pub enum PgDataError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A table or schema name is empty or blank
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// An operation was attempted on a table after `drop()`
    #[error("Table '{0}' has been dropped; this handle cannot be used again")]
    TableDropped(String),

    /// A filter, ordering or distinct key does not name a column of the table
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// An external program exited unsuccessfully
    #[error("{tool} failed (exit status: {}): {stderr}", status.map(|s| s.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ExternalToolFailure {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for pgdata operations
pub type Result<T> = std::result::Result<T, PgDataError>;
