//! Error types for the modelcheck-ml crate.

use crate::verify::report::VerificationReport;
use thiserror::Error;

/// Top-level error type for harness operations.
///
/// `Config` is fatal and aborts a pipeline before any partial result exists.
/// `Verification` carries every check that failed so one broken engine does not
/// hide the state of the others.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Verification failed: {0}")]
    Verification(VerificationReport),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] modelcheck_core::CoreError),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this is a configuration error (fatal, never retried).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// The failure report, if this is a verification failure.
    pub fn verification_report(&self) -> Option<&VerificationReport> {
        match self {
            Self::Verification(report) => Some(report),
            _ => None,
        }
    }
}

/// Attach a path to an IO error.
pub(crate) fn io_at(path: &std::path::Path, source: std::io::Error) -> MlError {
    MlError::Core(modelcheck_core::CoreError::persistence(path, source))
}
