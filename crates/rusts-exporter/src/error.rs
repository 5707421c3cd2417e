//! Error types for the exporter

use thiserror::Error;

/// Exporter errors
///
/// Every variant is fatal to the invocation that produced it. Nothing in the
/// crate retries or skips past an error, since a skipped query would yield an
/// export that looks complete but is missing series.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for exporter operations
pub type Result<T> = std::result::Result<T, ExportError>;
