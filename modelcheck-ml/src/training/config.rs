//! Training configuration and generic hyperparameters.

use crate::data::dataset::ColumnType;
use crate::data::schema::DataSpecification;
use crate::error::MlError;
use crate::model::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A generic hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperParameterValue {
    Integer(i64),
    Real(f64),
    Categorical(String),
}

impl HyperParameterValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Real value; integers are accepted as reals.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Categorical(_) => None,
        }
    }
}

impl fmt::Display for HyperParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Categorical(v) => f.write_str(v),
        }
    }
}

/// Hyperparameters by name, applied on top of the learner defaults.
pub type HyperParameters = BTreeMap<String, HyperParameterValue>;

/// A named hyperparameter set published by a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParameterPreset {
    pub name: String,
    pub parameters: HyperParameters,
}

/// Everything a learner needs to know about a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learner: String,
    pub task: Task,
    pub label: String,
    /// Input features; empty means every column that is not label, weight,
    /// group or treatment.
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub ranking_group: Option<String>,
    #[serde(default)]
    pub uplift_treatment: Option<String>,
    #[serde(default)]
    pub hyperparameters: HyperParameters,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default)]
    pub maximum_training_duration_secs: Option<f64>,
    /// Loss designation overriding the learner default.
    #[serde(default)]
    pub loss: Option<String>,
}

fn default_random_seed() -> u64 {
    123456
}

impl TrainingConfig {
    pub fn new(learner: impl Into<String>, task: Task, label: impl Into<String>) -> Self {
        Self {
            learner: learner.into(),
            task,
            label: label.into(),
            features: Vec::new(),
            weight: None,
            ranking_group: None,
            uplift_treatment: None,
            hyperparameters: HyperParameters::new(),
            random_seed: default_random_seed(),
            maximum_training_duration_secs: None,
            loss: None,
        }
    }

    pub fn with_hyperparameter(mut self, name: impl Into<String>, value: HyperParameterValue) -> Self {
        self.hyperparameters.insert(name.into(), value);
        self
    }

    /// Columns playing a special role (never used as input features).
    fn special_columns(&self) -> Vec<&str> {
        let mut special = vec![self.label.as_str()];
        special.extend(self.weight.as_deref());
        special.extend(self.ranking_group.as_deref());
        special.extend(self.uplift_treatment.as_deref());
        special
    }

    /// Resolved input features, in specification order when implicit.
    pub fn input_features(&self, spec: &DataSpecification) -> Vec<String> {
        if !self.features.is_empty() {
            return self.features.clone();
        }
        let special = self.special_columns();
        spec.columns
            .iter()
            .map(|c| c.name.clone())
            .filter(|name| !special.contains(&name.as_str()))
            .collect()
    }

    /// Check the configuration against a data specification.
    ///
    /// Every referenced column must exist and the label, group and treatment
    /// columns must have types compatible with the task.
    pub fn validate(&self, spec: &DataSpecification) -> Result<(), MlError> {
        if self.learner.is_empty() {
            return Err(MlError::config("no learner specified"));
        }
        let label_type = spec.require_column(&self.label)?.column_type;
        for feature in &self.features {
            spec.require_column(feature)?;
        }
        if let Some(weight) = &self.weight {
            expect_type(spec, weight, ColumnType::Numerical, "weight")?;
        }
        if let Some(secs) = self.maximum_training_duration_secs {
            if !(secs >= 0.0 && secs.is_finite()) {
                return Err(MlError::config(format!(
                    "maximum training duration must be a finite non-negative number, got {secs}"
                )));
            }
        }

        let expected_label = match self.task {
            Task::Classification | Task::CategoricalUplift => ColumnType::Categorical,
            Task::Regression | Task::Ranking | Task::NumericalUplift => ColumnType::Numerical,
        };
        if label_type != expected_label {
            return Err(MlError::config(format!(
                "label \"{}\" is {label_type} but task {} needs a {expected_label} label",
                self.label, self.task
            )));
        }

        match (self.task, &self.ranking_group) {
            (Task::Ranking, None) => {
                return Err(MlError::config("ranking task requires a ranking group column"));
            }
            (_, Some(group)) => {
                spec.require_column(group)?;
            }
            _ => {}
        }

        match (self.task.is_uplift(), &self.uplift_treatment) {
            (true, None) => {
                return Err(MlError::config(format!(
                    "task {} requires an uplift treatment column",
                    self.task
                )));
            }
            (_, Some(treatment)) => {
                expect_type(spec, treatment, ColumnType::Categorical, "treatment")?;
            }
            _ => {}
        }

        if self.input_features(spec).is_empty() {
            return Err(MlError::config("training configuration has no input features"));
        }
        Ok(())
    }
}

fn expect_type(
    spec: &DataSpecification,
    column: &str,
    expected: ColumnType,
    role: &str,
) -> Result<(), MlError> {
    let actual = spec.require_column(column)?.column_type;
    if actual != expected {
        return Err(MlError::config(format!(
            "{role} column \"{column}\" is {actual}, expected {expected}"
        )));
    }
    Ok(())
}
