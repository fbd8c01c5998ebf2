//! Model and inference engine abstractions.
//!
//! A [`Model`] always offers a reference engine, the slow but trusted path, and
//! may offer specialized engines. Every engine implements [`BatchPredict`], so
//! the checkers compare any engine against any other through one interface.

pub mod io;
pub mod prediction;

pub use io::{ModelLoader, ModelLoaderRegistry, SerializationForm};
pub use prediction::Prediction;

use crate::data::Dataset;
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;

/// Learning task of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification,
    Regression,
    Ranking,
    CategoricalUplift,
    NumericalUplift,
}

impl Task {
    pub fn is_uplift(&self) -> bool {
        matches!(self, Self::CategoricalUplift | Self::NumericalUplift)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classification => "CLASSIFICATION",
            Self::Regression => "REGRESSION",
            Self::Ranking => "RANKING",
            Self::CategoricalUplift => "CATEGORICAL_UPLIFT",
            Self::NumericalUplift => "NUMERICAL_UPLIFT",
        };
        f.write_str(name)
    }
}

/// A contiguous range of examples of a dataset.
#[derive(Debug, Clone, Copy)]
pub struct ExampleBatch<'a> {
    dataset: &'a Dataset,
    begin: usize,
    end: usize,
}

impl<'a> ExampleBatch<'a> {
    /// Rows `begin..end` of `dataset`; `end` is clamped to the row count.
    pub fn new(dataset: &'a Dataset, begin: usize, end: usize) -> Self {
        let end = end.min(dataset.nrow());
        Self {
            dataset,
            begin: begin.min(end),
            end,
        }
    }

    /// The whole dataset as one batch.
    pub fn all(dataset: &'a Dataset) -> Self {
        Self::new(dataset, 0, dataset.nrow())
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn rows(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// An inference capability: consume a batch of N examples, return N predictions.
pub trait BatchPredict {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn predict_batch(&self, batch: &ExampleBatch<'_>) -> Result<Vec<Prediction>, MlError>;
}

/// Outcome of asking a model for one of its specialized engines.
pub enum EngineAvailability<'m> {
    Available(Box<dyn BatchPredict + 'm>),
    /// The model cannot build this engine (unsupported task or feature types).
    Unsupported { name: String, reason: String },
}

impl EngineAvailability<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Available(engine) => engine.name(),
            Self::Unsupported { name, .. } => name,
        }
    }
}

/// Importance of one input attribute for a given importance measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableImportance {
    pub attribute: String,
    pub importance: f64,
}

/// A trained model. Never mutated after creation.
pub trait Model: fmt::Debug + Send + Sync {
    /// Representation name, used to find a loader when deserializing.
    fn kind(&self) -> &str;

    fn task(&self) -> Task;

    fn label(&self) -> &str;

    /// Class names, in the order of classification probabilities.
    fn label_classes(&self) -> &[String] {
        &[]
    }

    /// Treatment column of uplift models.
    fn uplift_treatment(&self) -> Option<&str> {
        None
    }

    /// The trusted engine, valid for every task.
    fn reference_engine(&self) -> Box<dyn BatchPredict + '_>;

    /// Every specialized engine this representation knows about.
    fn specialized_engines(&self) -> Vec<EngineAvailability<'_>> {
        Vec::new()
    }

    /// Write the model content into an existing directory.
    fn save_to_directory(&self, dir: &Path) -> Result<(), MlError>;

    /// Serialize the model content to bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, MlError>;

    /// Serialized content excluding metadata such as timestamps or training
    /// duration. Two models with equal semantic bytes behave identically.
    fn semantic_bytes(&self) -> Result<Vec<u8>, MlError>;

    /// Human-readable description; `full` includes the complete structure.
    fn describe(&self, full: bool) -> String;

    /// Variable importances, keyed by importance measure.
    fn variable_importances(&self) -> BTreeMap<String, Vec<VariableImportance>> {
        BTreeMap::new()
    }

    /// Whether training ended early because its stop signal was raised.
    fn interrupted(&self) -> bool {
        false
    }
}

/// Predictions of `engine` over a whole dataset, `batch_size` examples at a time.
pub fn predict_dataset(
    engine: &dyn BatchPredict,
    dataset: &Dataset,
    batch_size: usize,
) -> Result<Vec<Prediction>, MlError> {
    let batch_size = batch_size.max(1);
    let mut predictions = Vec::with_capacity(dataset.nrow());
    let mut begin = 0;
    while begin < dataset.nrow() {
        let batch = ExampleBatch::new(dataset, begin, begin + batch_size);
        let batch_predictions = engine.predict_batch(&batch)?;
        if batch_predictions.len() != batch.len() {
            return Err(MlError::inference(format!(
                "engine \"{}\" returned {} predictions for {} examples",
                engine.name(),
                batch_predictions.len(),
                batch.len()
            )));
        }
        predictions.extend(batch_predictions);
        begin += batch_size;
    }
    Ok(predictions)
}
