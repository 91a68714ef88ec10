//! Error types for the drift and migration library.

use thiserror::Error;

/// Main error type for comparison and migration operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, unresolved secrets)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database could not be reached. Fatal to the whole run.
    #[error("Connection to {side} database failed: {message}")]
    Connection { side: String, message: String },

    /// Driver-level error while running a statement
    #[error("Database error: {0}")]
    Query(#[from] tiberius::error::Error),

    /// Catalog query returned something unusable
    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    /// Reading rows from a source table failed
    #[error("Read failed for table {table}: {message}")]
    Read { table: String, message: String },

    /// Writing or deleting rows in a target table failed
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a Connection error for one side of the run.
    pub fn connection(side: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Connection {
            side: side.into(),
            message: message.into(),
        }
    }

    /// Create a Read error
    pub fn read(table: impl ToString, message: impl Into<String>) -> Self {
        SyncError::Read {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl ToString, message: impl Into<String>) -> Self {
        SyncError::Write {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) | SyncError::Json(_) => 1,
            SyncError::Connection { .. } => 2,
            SyncError::Query(_) | SyncError::Introspection(_) => 3,
            SyncError::Read { .. } | SyncError::Write { .. } => 4,
            SyncError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, SyncError>;
