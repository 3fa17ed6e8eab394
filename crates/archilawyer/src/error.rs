//! Error types for archilawyer.
//!
//! This module defines all error types used throughout the archilawyer crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for archilawyer operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A credential required by the command is not configured.
    #[error("missing credential: {name} (set it in the config file or via {env_var})")]
    MissingCredential {
        /// Dotted config key of the credential.
        name: &'static str,
        /// Environment variable that can provide it.
        env_var: &'static str,
    },

    // === Document Errors ===
    /// Text could not be extracted from a PDF.
    #[error("failed to extract text from {path}: {message}")]
    Pdf {
        /// Path to the PDF file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The question was empty after trimming.
    #[error("please enter a question")]
    EmptyQuestion,

    // === Remote Service Errors ===
    /// HTTP transport failed (connection, TLS, decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote service answered with a non-success status.
    #[error("{service} API returned {status}: {body}")]
    Api {
        /// Name of the remote service.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The named vector index does not exist.
    #[error("vector index '{name}' not found")]
    IndexNotFound {
        /// Index name.
        name: String,
    },

    /// Vector dimensions disagree between the embedding model and the index.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index or config expects.
        expected: usize,
        /// Dimension actually observed.
        actual: usize,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for archilawyer operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a remote API error.
    #[must_use]
    pub fn api(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            body: body.into(),
        }
    }

    /// Create a PDF extraction error.
    #[must_use]
    pub fn pdf(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Pdf {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error is a missing credential.
    #[must_use]
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential { .. })
    }

    /// Check if this error means the index does not exist.
    #[must_use]
    pub fn is_index_not_found(&self) -> bool {
        matches!(self, Self::IndexNotFound { .. })
    }

    /// HTTP status of a remote API error, if this is one.
    #[must_use]
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
