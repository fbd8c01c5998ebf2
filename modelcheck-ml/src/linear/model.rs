//! The linear model representation and its persistence.

use crate::data::dataset::Value;
use crate::error::{MlError, io_at};
use crate::linear::engine::{FlatEngine, FlatLayout, ReferenceEngine};
use crate::model::{
    BatchPredict, EngineAvailability, Model, ModelLoader, Prediction, Task, VariableImportance,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

pub const LINEAR_MODEL_KIND: &str = "LINEAR";

/// File holding the model content inside a model directory.
const MODEL_FILE_NAME: &str = "model.json";

/// Importance measure published by linear models.
pub const MEAN_ABS_WEIGHT: &str = "MEAN_ABS_WEIGHT";

/// How an input column is turned into a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureEncoding {
    /// Standardized value; missing values encode to 0 (the mean).
    Numerical { mean: f32, std_dev: f32 },
    /// Index in the vocabulary plus one; 0 is missing or out of vocabulary.
    Categorical { vocabulary: Vec<String> },
}

impl FeatureEncoding {
    /// Number of weights a head holds for this feature.
    pub fn num_weights(&self) -> usize {
        match self {
            Self::Numerical { .. } => 1,
            Self::Categorical { vocabulary } => vocabulary.len() + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFeature {
    pub name: String,
    pub encoding: FeatureEncoding,
    /// Whether the source column holds free text (kept whole as one token).
    #[serde(default)]
    pub is_text: bool,
}

impl InputFeature {
    /// Encode a cell. `lookup` resolves a categorical value to its vocabulary
    /// position; engines plug in their own lookup structure.
    pub(crate) fn encode_with(
        &self,
        value: &Value,
        lookup: impl FnOnce(&str) -> Option<usize>,
    ) -> Result<f32, MlError> {
        match (&self.encoding, value) {
            (_, Value::Missing) => Ok(0.0),
            (FeatureEncoding::Numerical { mean, std_dev }, Value::Numerical(v)) => {
                Ok((v - mean) / std_dev)
            }
            (FeatureEncoding::Categorical { .. }, Value::Categorical(s) | Value::Text(s)) => {
                Ok(lookup(s).map_or(0.0, |i| (i + 1) as f32))
            }
            (_, other) => Err(MlError::inference(format!(
                "feature \"{}\" cannot encode value {other:?}",
                self.name
            ))),
        }
    }

    /// Encode with a linear vocabulary scan.
    pub(crate) fn encode(&self, value: &Value) -> Result<f32, MlError> {
        self.encode_with(value, |s| match &self.encoding {
            FeatureEncoding::Categorical { vocabulary } => vocabulary.iter().position(|v| v == s),
            FeatureEncoding::Numerical { .. } => None,
        })
    }
}

/// One linear scoring function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub bias: f32,
    /// Weights per input feature, `num_weights()` entries each.
    pub weights: Vec<Vec<f32>>,
}

impl Head {
    pub fn zeros(features: &[InputFeature], bias: f32) -> Self {
        Self {
            bias,
            weights: features
                .iter()
                .map(|f| vec![0.0; f.encoding.num_weights()])
                .collect(),
        }
    }

    /// Score of an encoded example. `x(f)` is the encoded value of feature `f`.
    ///
    /// Every engine goes through this function, so equal encodings give
    /// bit-identical scores.
    pub(crate) fn score(&self, features: &[InputFeature], x: impl Fn(usize) -> f32) -> f32 {
        let mut score = self.bias;
        for (f, (feature, w)) in features.iter().zip(&self.weights).enumerate() {
            let v = x(f);
            score += match feature.encoding {
                FeatureEncoding::Numerical { .. } => w[0] * v,
                FeatureEncoding::Categorical { .. } => w.get(v as usize).copied().unwrap_or(0.0),
            };
        }
        score
    }
}

/// Training metadata. Excluded from the semantic content of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub learner: String,
    pub created_at: DateTime<Utc>,
    pub training_duration_secs: f64,
    pub seed: u64,
    pub epochs_completed: usize,
    pub interrupted: bool,
}

/// A trained linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub task: Task,
    pub label: String,
    /// Classification classes, one head each. For categorical uplift, the
    /// second class is the positive outcome.
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    /// Treatment values; the first one is the control group.
    #[serde(default)]
    pub treatments: Vec<String>,
    pub features: Vec<InputFeature>,
    pub heads: Vec<Head>,
    pub metadata: ModelMetadata,
}

#[derive(Serialize)]
struct SemanticContent<'a> {
    task: Task,
    label: &'a str,
    classes: &'a [String],
    treatment: &'a Option<String>,
    treatments: &'a [String],
    features: &'a [InputFeature],
    heads: &'a [Head],
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl LinearModel {
    /// Check the structural invariants of the model.
    pub fn validate(&self) -> Result<(), MlError> {
        let expected_heads = match self.task {
            Task::Classification => self.classes.len(),
            Task::Regression | Task::Ranking => 1,
            Task::CategoricalUplift | Task::NumericalUplift => 2,
        };
        if self.heads.len() != expected_heads {
            return Err(MlError::model(format!(
                "{} model has {} heads, expected {expected_heads}",
                self.task,
                self.heads.len()
            )));
        }
        if self.task == Task::Classification && self.classes.len() < 2 {
            return Err(MlError::model("classification model needs at least 2 classes"));
        }
        if self.task.is_uplift() && (self.treatment.is_none() || self.treatments.len() != 2) {
            return Err(MlError::model(
                "uplift model needs a treatment column with exactly 2 values",
            ));
        }
        for head in &self.heads {
            if head.weights.len() != self.features.len()
                || head
                    .weights
                    .iter()
                    .zip(&self.features)
                    .any(|(w, f)| w.len() != f.encoding.num_weights())
            {
                return Err(MlError::model("head weights do not match the input features"));
            }
        }
        Ok(())
    }

    /// Turn head scores into a prediction.
    pub(crate) fn finish(&self, scores: &[f32]) -> Prediction {
        match self.task {
            Task::Classification => Prediction::Classification {
                probabilities: softmax(scores),
            },
            Task::Regression => Prediction::Regression { value: scores[0] },
            Task::Ranking => Prediction::Ranking {
                relevance: scores[0],
            },
            Task::NumericalUplift => Prediction::Uplift {
                treatment_effect: vec![scores[1] - scores[0]],
            },
            Task::CategoricalUplift => Prediction::Uplift {
                treatment_effect: vec![sigmoid(scores[1]) - sigmoid(scores[0])],
            },
        }
    }

    /// Whether any input feature is free text.
    pub fn has_text_features(&self) -> bool {
        self.features.iter().any(|f| f.is_text)
    }

    fn semantic(&self) -> SemanticContent<'_> {
        SemanticContent {
            task: self.task,
            label: &self.label,
            classes: &self.classes,
            treatment: &self.treatment,
            treatments: &self.treatments,
            features: &self.features,
            heads: &self.heads,
        }
    }

    fn flat_engine(&self, layout: FlatLayout) -> EngineAvailability<'_> {
        let name = layout.engine_name().to_string();
        if self.task.is_uplift() {
            return EngineAvailability::Unsupported {
                name,
                reason: format!("{} models are served by the reference engine only", self.task),
            };
        }
        if self.has_text_features() {
            return EngineAvailability::Unsupported {
                name,
                reason: "text features are not supported by flat engines".to_string(),
            };
        }
        EngineAvailability::Available(Box::new(FlatEngine::new(self, layout)))
    }
}

impl Model for LinearModel {
    fn kind(&self) -> &str {
        LINEAR_MODEL_KIND
    }

    fn interrupted(&self) -> bool {
        self.metadata.interrupted
    }

    fn task(&self) -> Task {
        self.task
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn label_classes(&self) -> &[String] {
        &self.classes
    }

    fn uplift_treatment(&self) -> Option<&str> {
        self.treatment.as_deref()
    }

    fn reference_engine(&self) -> Box<dyn BatchPredict + '_> {
        Box::new(ReferenceEngine::new(self))
    }

    fn specialized_engines(&self) -> Vec<EngineAvailability<'_>> {
        vec![
            self.flat_engine(FlatLayout::ExampleMajor),
            self.flat_engine(FlatLayout::FeatureMajor),
        ]
    }

    fn save_to_directory(&self, dir: &Path) -> Result<(), MlError> {
        let path = dir.join(MODEL_FILE_NAME);
        modelcheck_core::persistence::atomic_write_json(&path, self).map_err(|e| io_at(&path, e))
    }

    fn to_bytes(&self) -> Result<Vec<u8>, MlError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn semantic_bytes(&self) -> Result<Vec<u8>, MlError> {
        Ok(serde_json::to_vec(&self.semantic())?)
    }

    fn describe(&self, full: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Type: \"{LINEAR_MODEL_KIND}\"");
        let _ = writeln!(out, "Task: {}", self.task);
        let _ = writeln!(out, "Label: \"{}\"", self.label);
        if !self.classes.is_empty() {
            let _ = writeln!(out, "Classes: {:?}", self.classes);
        }
        if let Some(treatment) = &self.treatment {
            let _ = writeln!(out, "Treatment: \"{treatment}\" {:?}", self.treatments);
        }
        let _ = writeln!(out, "Input features ({}):", self.features.len());
        for feature in &self.features {
            let kind = match (&feature.encoding, feature.is_text) {
                (FeatureEncoding::Numerical { .. }, _) => "NUMERICAL".to_string(),
                (FeatureEncoding::Categorical { vocabulary }, false) => {
                    format!("CATEGORICAL ({} values)", vocabulary.len())
                }
                (FeatureEncoding::Categorical { vocabulary }, true) => {
                    format!("TEXT ({} values)", vocabulary.len())
                }
            };
            let _ = writeln!(out, "\t\"{}\" {kind}", feature.name);
        }
        let _ = writeln!(
            out,
            "Trained by \"{}\" for {} epochs (seed {}{})",
            self.metadata.learner,
            self.metadata.epochs_completed,
            self.metadata.seed,
            if self.metadata.interrupted { ", interrupted" } else { "" }
        );
        if full {
            for (h, head) in self.heads.iter().enumerate() {
                let _ = writeln!(out, "Head {h}: bias={}", head.bias);
                for (feature, weights) in self.features.iter().zip(&head.weights) {
                    let _ = writeln!(out, "\t\"{}\": {weights:?}", feature.name);
                }
            }
        }
        out
    }

    fn variable_importances(&self) -> BTreeMap<String, Vec<VariableImportance>> {
        let mut importances: Vec<VariableImportance> = self
            .features
            .iter()
            .enumerate()
            .map(|(f, feature)| {
                let total: f64 = self
                    .heads
                    .iter()
                    .map(|head| {
                        let w = &head.weights[f];
                        w.iter().map(|v| f64::from(v.abs())).sum::<f64>() / w.len().max(1) as f64
                    })
                    .sum();
                VariableImportance {
                    attribute: feature.name.clone(),
                    importance: total / self.heads.len().max(1) as f64,
                }
            })
            .collect();
        importances.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.attribute.cmp(&b.attribute))
        });
        BTreeMap::from([(MEAN_ABS_WEIGHT.to_string(), importances)])
    }
}

/// Loader for [`LinearModel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearModelLoader;

impl LinearModelLoader {
    fn checked(model: LinearModel) -> Result<Box<dyn Model>, MlError> {
        model.validate()?;
        Ok(Box::new(model))
    }
}

impl ModelLoader for LinearModelLoader {
    fn kind(&self) -> &str {
        LINEAR_MODEL_KIND
    }

    fn load_directory(&self, dir: &Path) -> Result<Box<dyn Model>, MlError> {
        let path = dir.join(MODEL_FILE_NAME);
        let model: LinearModel = modelcheck_core::persistence::load_json(&path)
            .map_err(|e| io_at(&path, e))?
            .ok_or_else(|| MlError::not_found(format!("{} is missing", path.display())))?;
        Self::checked(model)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Box<dyn Model>, MlError> {
        Self::checked(serde_json::from_slice(bytes)?)
    }
}
