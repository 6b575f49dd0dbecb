//! Error types for IR documents.

use std::path::PathBuf;

use crate::types::Type;

/// Errors that can occur while reading or inspecting a program.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error reading/writing program files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Program file not found.
    #[error("program file not found: {}", .path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Two `Return` statements disagree on the returned type.
    #[error("return type mismatch: expected {expected}, found {found}")]
    ReturnTypeMismatch { expected: Type, found: Type },
}

/// Result type for IR operations.
pub type Result<T> = std::result::Result<T, IrError>;
