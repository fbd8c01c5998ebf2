//! Learner abstraction and registry.

use crate::data::dataset::Dataset;
use crate::data::format::{TypedPath, read_dataset};
use crate::data::schema::DataSpecification;
use crate::error::MlError;
use crate::model::Model;
use crate::training::config::{HyperParameterPreset, HyperParameters, TrainingConfig};
use crate::training::deadline::StopSignal;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Training or validation data handed to a learner.
#[derive(Debug, Clone)]
pub enum DatasetInput<'a> {
    InMemory(&'a Dataset),
    /// Files read by the learner itself.
    Path(TypedPath),
}

impl<'a> DatasetInput<'a> {
    /// Materialize the data, reading it from disk for path inputs.
    pub fn load(&self, spec: &DataSpecification) -> Result<Cow<'a, Dataset>, MlError> {
        match self {
            Self::InMemory(dataset) => Ok(Cow::Borrowed(*dataset)),
            Self::Path(path) => Ok(Cow::Owned(read_dataset(path, spec)?)),
        }
    }
}

impl fmt::Display for DatasetInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory(dataset) => write!(f, "in-memory dataset ({} rows)", dataset.nrow()),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

/// One call to [`Learner::train`].
#[derive(Debug, Clone)]
pub struct TrainingRequest<'a> {
    pub config: &'a TrainingConfig,
    pub spec: &'a DataSpecification,
    pub train: DatasetInput<'a>,
    pub valid: Option<DatasetInput<'a>>,
    /// Raised when the learner should wrap up and return what it has.
    pub stop: StopSignal,
}

/// A training algorithm.
pub trait Learner: Send {
    fn name(&self) -> &str;

    /// Apply generic hyperparameters. Unknown names and ill-typed values are
    /// configuration errors.
    fn set_hyperparameters(&mut self, hyperparameters: &HyperParameters) -> Result<(), MlError>;

    /// Named hyperparameter sets the learner publishes.
    fn predefined_hyperparameters(&self) -> Vec<HyperParameterPreset> {
        Vec::new()
    }

    fn train(&self, request: TrainingRequest<'_>) -> Result<Box<dyn Model>, MlError>;
}

type LearnerFactory = Box<dyn Fn() -> Box<dyn Learner> + Send + Sync>;

/// Learner factories keyed by learner name.
#[derive(Default)]
pub struct LearnerRegistry {
    factories: HashMap<String, LearnerFactory>,
}

impl LearnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every learner shipped with this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::linear::LINEAR_LEARNER_NAME, || {
            Box::new(crate::linear::LinearLearner::default())
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Learner> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Fresh learner instance; unknown names are configuration errors.
    pub fn create(&self, name: &str) -> Result<Box<dyn Learner>, MlError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            MlError::config(format!(
                "unknown learner \"{name}\", registered learners: {:?}",
                self.names()
            ))
        })?;
        Ok(factory())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for LearnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnerRegistry")
            .field("learners", &self.names())
            .finish()
    }
}
