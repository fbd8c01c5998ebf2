//! Inference engines of linear models.
//!
//! The reference engine resolves every feature column by name and encodes
//! each cell on the fly. The flat engines resolve columns once per batch, fill
//! a dense `f32` buffer (example-major or feature-major) and score from it.

use crate::error::MlError;
use crate::linear::model::{FeatureEncoding, LinearModel};
use crate::model::{BatchPredict, ExampleBatch, Prediction};
use std::collections::HashMap;

/// Row-by-row engine, the trusted path.
pub struct ReferenceEngine<'m> {
    model: &'m LinearModel,
}

impl<'m> ReferenceEngine<'m> {
    pub fn new(model: &'m LinearModel) -> Self {
        Self { model }
    }
}

impl BatchPredict for ReferenceEngine<'_> {
    fn name(&self) -> &str {
        "reference"
    }

    fn predict_batch(&self, batch: &ExampleBatch<'_>) -> Result<Vec<Prediction>, MlError> {
        let dataset = batch.dataset();
        let model = self.model;
        let mut predictions = Vec::with_capacity(batch.len());
        for row in batch.rows() {
            let mut encoded = Vec::with_capacity(model.features.len());
            for feature in &model.features {
                let col = dataset.column_index(&feature.name).ok_or_else(|| {
                    MlError::inference(format!("input feature \"{}\" not in dataset", feature.name))
                })?;
                encoded.push(feature.encode(&dataset.value(row, col))?);
            }
            let scores: Vec<f32> = model
                .heads
                .iter()
                .map(|head| head.score(&model.features, |f| encoded[f]))
                .collect();
            predictions.push(model.finish(&scores));
        }
        Ok(predictions)
    }
}

/// Memory layout of the flat engine buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatLayout {
    /// `buffer[example * num_features + feature]`
    ExampleMajor,
    /// `buffer[feature * num_examples + example]`
    FeatureMajor,
}

impl FlatLayout {
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::ExampleMajor => "flat_example_major",
            Self::FeatureMajor => "flat_feature_major",
        }
    }

    fn index(&self, example: usize, feature: usize, num_examples: usize, num_features: usize) -> usize {
        match self {
            Self::ExampleMajor => example * num_features + feature,
            Self::FeatureMajor => feature * num_examples + example,
        }
    }
}

/// Batch engine scoring from a dense buffer of encoded features.
pub struct FlatEngine<'m> {
    model: &'m LinearModel,
    layout: FlatLayout,
    /// Vocabulary position by value, per feature (empty for numerical ones).
    vocabularies: Vec<HashMap<&'m str, usize>>,
}

impl<'m> FlatEngine<'m> {
    pub fn new(model: &'m LinearModel, layout: FlatLayout) -> Self {
        let vocabularies = model
            .features
            .iter()
            .map(|feature| match &feature.encoding {
                FeatureEncoding::Categorical { vocabulary } => vocabulary
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.as_str(), i))
                    .collect(),
                FeatureEncoding::Numerical { .. } => HashMap::new(),
            })
            .collect();
        Self {
            model,
            layout,
            vocabularies,
        }
    }

    fn fill_buffer(&self, batch: &ExampleBatch<'_>) -> Result<Vec<f32>, MlError> {
        let dataset = batch.dataset();
        let num_examples = batch.len();
        let num_features = self.model.features.len();
        let mut buffer = vec![0.0f32; num_examples * num_features];
        for (f, feature) in self.model.features.iter().enumerate() {
            let col = dataset.column_index(&feature.name).ok_or_else(|| {
                MlError::inference(format!("input feature \"{}\" not in dataset", feature.name))
            })?;
            let vocabulary = &self.vocabularies[f];
            for (e, row) in batch.rows().enumerate() {
                let value = dataset.value(row, col);
                let idx = self.layout.index(e, f, num_examples, num_features);
                buffer[idx] = feature.encode_with(&value, |s| vocabulary.get(s).copied())?;
            }
        }
        Ok(buffer)
    }
}

impl BatchPredict for FlatEngine<'_> {
    fn name(&self) -> &str {
        self.layout.engine_name()
    }

    fn predict_batch(&self, batch: &ExampleBatch<'_>) -> Result<Vec<Prediction>, MlError> {
        let buffer = self.fill_buffer(batch)?;
        let num_examples = batch.len();
        let num_features = self.model.features.len();
        let mut scores = vec![0.0f32; self.model.heads.len()];
        let mut predictions = Vec::with_capacity(num_examples);
        for e in 0..num_examples {
            for (score, head) in scores.iter_mut().zip(&self.model.heads) {
                *score = head.score(&self.model.features, |f| {
                    buffer[self.layout.index(e, f, num_examples, num_features)]
                });
            }
            predictions.push(self.model.finish(&scores));
        }
        Ok(predictions)
    }
}
