//! Error types for the UniChem indexer
//!
//! The taxonomy mirrors how failures are handled: database and index errors
//! are recoverable worker outcomes, parse errors are fatal, configuration
//! errors abort startup, and cancellation is not an error at all.

use thiserror::Error;

/// Result type alias for indexer operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Main error type for the UniChem indexer
#[derive(Error, Debug)]
pub enum IndexError {
    /// File system operations failed (log dir creation, config read, etc.)
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Relational database operation failed
    #[error("Database operation failed: {operation} - {reason}")]
    Database { operation: String, reason: String },

    /// Search index request failed (network, auth, non-2xx status)
    #[error("Index request '{operation}' failed: {reason}")]
    Index { operation: String, reason: String },

    /// Document store (source metadata) operation failed
    #[error("Document store operation failed: {operation} - {reason}")]
    DocumentStore { operation: String, reason: String },

    /// Failed to parse input data
    #[error("Failed to parse {data_type}: {reason}")]
    Parse { data_type: String, reason: String },

    /// Configuration is missing or invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The run's cancellation scope was tripped
    #[error("Operation canceled")]
    Canceled,
}

impl IndexError {
    /// Create a database error
    pub fn database(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an index error
    pub fn index(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Index {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a document store error
    pub fn document_store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DocumentStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error
    pub fn parse(data_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            data_type: data_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
