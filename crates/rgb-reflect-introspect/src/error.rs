//! Error types for introspection operations.

use thiserror::Error;

/// Errors that can occur while producing or loading dumps.
#[derive(Debug, Error)]
pub enum IntrospectError {
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a dump file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested class is not registered.
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// A dump was written by an incompatible format revision.
    #[error("Unsupported dump format {found}, expected {expected}")]
    UnsupportedFormat { found: u32, expected: u32 },
}
