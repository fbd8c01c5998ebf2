//! Aggregated verification failures.

use crate::error::MlError;
use crate::model::{Prediction, SerializationForm};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One failed check, with enough context to locate the problem.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationFailure {
    #[error(
        "engine \"{engine}\" disagrees with the reference on row {row} (batch {batch}): expected {expected}, got {actual}"
    )]
    PredictionMismatch {
        engine: String,
        batch: usize,
        row: usize,
        expected: Prediction,
        actual: Prediction,
    },

    #[error("engine \"{engine}\" returned {actual} predictions for batch {batch} of {expected} examples")]
    BatchSizeMismatch {
        engine: String,
        batch: usize,
        expected: usize,
        actual: usize,
    },

    #[error("engine \"{engine}\" failed: {message}")]
    EngineError { engine: String, message: String },

    #[error("{form} serialization failed: {message}")]
    Serialization {
        form: SerializationForm,
        message: String,
    },

    #[error(
        "model reloaded from {form} form predicts differently on row {row}: expected {expected}, got {actual}"
    )]
    SerializationMismatch {
        form: SerializationForm,
        row: usize,
        expected: Prediction,
        actual: Prediction,
    },

    #[error("golden model \"{model_name}\": {message}")]
    GoldenModel { model_name: String, message: String },

    #[error("learner publishes {actual} predefined hyperparameter sets, expected {expected}")]
    PresetCount { expected: usize, actual: usize },

    #[error("preset \"{preset}\" reached accuracy {accuracy}, below the floor {min_accuracy}")]
    PresetAccuracy {
        preset: String,
        accuracy: f64,
        min_accuracy: f64,
    },

    #[error("preset \"{preset}\" failed: {message}")]
    PresetFailed { preset: String, message: String },

    #[error(
        "metric \"{metric}\" of test \"{test}\" is {value}, outside {center} +/- {margin} ({}:{line})",
        .file.display()
    )]
    MetricOutOfMargin {
        test: String,
        metric: String,
        value: f64,
        center: f64,
        margin: f64,
        file: PathBuf,
        line: u32,
    },

    #[error(
        "metric \"{metric}\" of test \"{test}\" is {value}, expected gold value {gold} ({}:{line})",
        .file.display()
    )]
    MetricGoldMismatch {
        test: String,
        metric: String,
        value: f64,
        gold: f64,
        file: PathBuf,
        line: u32,
    },
}

/// An engine that was not checked because the model cannot build it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEngine {
    pub name: String,
    pub reason: String,
}

/// Every failure of a verification step. Empty means success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    pub failures: Vec<VerificationFailure>,
    pub skipped_engines: Vec<SkippedEngine>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, failure: VerificationFailure) {
        self.failures.push(failure);
    }

    pub fn merge(&mut self, other: Self) {
        self.failures.extend(other.failures);
        self.skipped_engines.extend(other.skipped_engines);
    }

    /// `Ok` when nothing failed, else a verification error carrying this report.
    pub fn into_result(self) -> Result<(), MlError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(MlError::Verification(self))
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl From<VerificationFailure> for VerificationReport {
    fn from(failure: VerificationFailure) -> Self {
        Self {
            failures: vec![failure],
            skipped_engines: Vec::new(),
        }
    }
}
