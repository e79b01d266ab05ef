//! Error types for the processing service.

use std::path::PathBuf;
use thiserror::Error;

use crate::asset::Locator;

/// Errors reported by a processing service.
///
/// The `Display` output is shown to users verbatim when a job fails, so the
/// messages are written to stand on their own.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Source asset could not be read.
    #[error("Failed to read image {locator}: {reason}")]
    ReadFailed { locator: Locator, reason: String },

    /// Extension is not one the service can encode.
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: String },

    /// ImageMagick binary not found.
    #[error("ImageMagick not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// Work directory could not be created.
    #[error("Failed to create work directory: {path}")]
    WorkDirFailed { path: PathBuf },

    /// Encoder process failed.
    #[error("Compression failed: {reason}")]
    CompressionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Encoder process timed out.
    #[error("Compression timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Writing an export failed.
    #[error("Export failed: {reason}")]
    ExportFailed { reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The service connection itself is unusable.
    #[error("Processing service unavailable: {0}")]
    Unavailable(String),

    /// Free-form failure reported by the backend.
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn read_failed(locator: &Locator, reason: impl ToString) -> Self {
        Self::ReadFailed {
            locator: locator.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn compression_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::CompressionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn export_failed(reason: impl ToString) -> Self {
        Self::ExportFailed {
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the service cannot serve any further request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_verbatim() {
        let err = ServiceError::Other("disk on fire".to_string());
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_only_unavailable_is_fatal() {
        assert!(ServiceError::Unavailable("gone".into()).is_fatal());
        assert!(!ServiceError::Timeout { timeout_secs: 1 }.is_fatal());
        assert!(!ServiceError::compression_failed("bad", None).is_fatal());
    }

    #[test]
    fn test_read_failed_message() {
        let err = ServiceError::read_failed(&Locator::from("/x.png"), "No such file");
        assert_eq!(err.to_string(), "Failed to read image /x.png: No such file");
    }
}
