//! Error types for the scene exporter.

use thiserror::Error;

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export operations.
///
/// Cancellation is deliberately absent: a cancelled export is a terminal
/// [`ExportState`](crate::export::ExportState), not a failure.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Bad or missing configuration (empty output path, unknown start node).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The target document or its writer could not be created.
    #[error("Resource creation error: {0}")]
    ResourceCreation(String),

    /// The writer rejected initialization or failed while writing.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An exporter operation was called out of order.
    #[error("Cannot {operation} while exporter is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read or write JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

