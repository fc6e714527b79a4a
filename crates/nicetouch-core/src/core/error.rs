//! NiceTouch Error Definitions
//!
//! Defines error types used throughout the interchange engine.

use thiserror::Error;

use super::FrameCount;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Timeline Model Errors
    // =========================================================================
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Malformed OTIO payload: {0}")]
    MalformedOtio(String),

    #[error("Duration unavailable: {0}")]
    DurationUnavailable(String),

    // =========================================================================
    // Document Errors
    // =========================================================================
    #[error("Document validation failed: {0}")]
    DocumentInvalid(String),

    #[error("Invalid frame range at {location}: {reason}")]
    InvalidRange { location: String, reason: String },

    #[error("Invalid duration at {location}: {frames} frames")]
    InvalidDuration {
        location: String,
        frames: FrameCount,
    },

    #[error("Invalid metadata key {key:?}: {reason}")]
    InvalidMetadataKey { key: String, reason: String },

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("No {extension} file found in {dir}")]
    StagedFileMissing { dir: String, extension: String },

    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("NLE export failed: {0}")]
    ExportFailed(String),

    #[error("NLE import failed: {0}")]
    ImportFailed(String),

    #[error("Bridge process error: {0}")]
    BridgeError(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for a document shape error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        CoreError::DocumentInvalid(message.into())
    }

    /// Shorthand for a range error at a human-readable location.
    pub fn invalid_range(location: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidRange {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by the input data rather than the environment.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CoreError::TypeMismatch { .. }
                | CoreError::MalformedOtio(_)
                | CoreError::DocumentInvalid(_)
                | CoreError::InvalidRange { .. }
                | CoreError::InvalidDuration { .. }
                | CoreError::InvalidMetadataKey { .. }
                | CoreError::JsonError(_)
        )
    }
}
