//! Code generation errors.

use kiln_ir::IrError;
use kiln_targets::{BackendFamily, TargetError};
use thiserror::Error;

/// Errors that can occur while binding a backend or compiling through it.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// Probing or target lookup failed during construction.
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("no {family} backend is available for target '{target}' (built without the `llvm` feature?)")]
    BackendUnavailable {
        family: BackendFamily,
        target: String,
    },

    #[error("{operation} requires a successful compile first")]
    NotCompiled { operation: &'static str },

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("lowering failed: {message}")]
    Lowering { message: String },

    #[error("emission failed at {stage}: {message}")]
    Emit { stage: String, message: String },

    #[error("JIT compilation failed: {message}")]
    Jit { message: String },

    #[error("LLVM target initialization failed for {target}")]
    TargetInitFailed { target: String },

    #[error("invalid call to '{function}': {message}")]
    InvalidCall { function: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg_attr(not(feature = "llvm"), allow(dead_code))]
impl CodegenError {
    pub(crate) fn lowering(message: impl Into<String>) -> Self {
        CodegenError::Lowering {
            message: message.into(),
        }
    }

    pub(crate) fn emit(stage: &str, message: impl Into<String>) -> Self {
        CodegenError::Emit {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
