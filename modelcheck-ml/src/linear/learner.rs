//! Stochastic gradient descent trainer for [`LinearModel`].

use crate::data::dataset::{ColumnData, Dataset};
use crate::error::MlError;
use crate::linear::model::{
    FeatureEncoding, Head, InputFeature, LinearModel, ModelMetadata, sigmoid, softmax,
};
use crate::model::{Model, Task};
use crate::training::callbacks::{
    CallbackAction, DeadlineCallback, EarlyStoppingCallback, TrainingCallback,
};
use crate::training::config::{
    HyperParameterPreset, HyperParameterValue, HyperParameters, TrainingConfig,
};
use crate::training::learner::{Learner, TrainingRequest};
use crate::training::metrics::TrainingMetrics;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info};

pub const LINEAR_LEARNER_NAME: &str = "LINEAR";

/// Categorical vocabularies keep at most this many values.
const MAX_VOCABULARY_SIZE: usize = 2000;

const HUBER_DELTA: f32 = 1.0;

/// Hyperparameters of [`LinearLearner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearHyperParameters {
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub l2_regularization: f64,
    /// Epochs without improvement of the monitored loss before stopping; 0 disables.
    pub early_stopping_patience: usize,
}

impl Default for LinearHyperParameters {
    fn default() -> Self {
        Self {
            num_epochs: 20,
            learning_rate: 0.05,
            l2_regularization: 0.0,
            early_stopping_patience: 5,
        }
    }
}

fn positive_integer(name: &str, value: &HyperParameterValue) -> Result<usize, MlError> {
    match value.as_integer() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(MlError::config(format!(
            "hyperparameter \"{name}\" expects a non-negative integer, got {value}"
        ))),
    }
}

fn non_negative_real(name: &str, value: &HyperParameterValue) -> Result<f64, MlError> {
    match value.as_real() {
        Some(v) if v >= 0.0 && v.is_finite() => Ok(v),
        _ => Err(MlError::config(format!(
            "hyperparameter \"{name}\" expects a non-negative real, got {value}"
        ))),
    }
}

impl LinearHyperParameters {
    fn apply(&mut self, name: &str, value: &HyperParameterValue) -> Result<(), MlError> {
        match name {
            "num_epochs" => self.num_epochs = positive_integer(name, value)?.max(1),
            "learning_rate" => self.learning_rate = non_negative_real(name, value)?,
            "l2_regularization" => self.l2_regularization = non_negative_real(name, value)?,
            "early_stopping_patience" => {
                self.early_stopping_patience = positive_integer(name, value)?
            }
            other => {
                return Err(MlError::config(format!(
                    "unknown hyperparameter \"{other}\" for learner {LINEAR_LEARNER_NAME}"
                )));
            }
        }
        Ok(())
    }
}

/// Loss minimized by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loss {
    CrossEntropy,
    SquaredError,
    Huber,
}

impl Loss {
    fn resolve(task: Task, designation: Option<&str>) -> Result<Self, MlError> {
        let categorical = matches!(task, Task::Classification | Task::CategoricalUplift);
        match (designation, categorical) {
            (None, true) | (Some("cross_entropy"), true) => Ok(Self::CrossEntropy),
            (None, false) | (Some("squared_error"), false) => Ok(Self::SquaredError),
            (Some("huber"), false) => Ok(Self::Huber),
            (Some(other), _) => Err(MlError::config(format!(
                "loss \"{other}\" is not available for task {task}"
            ))),
        }
    }

    /// Loss and gradient with respect to the score, for a numerical target.
    fn regression(&self, score: f32, target: f32) -> (f64, f32) {
        let r = score - target;
        match self {
            Self::Huber if r.abs() > HUBER_DELTA => (
                f64::from(HUBER_DELTA * (r.abs() - 0.5 * HUBER_DELTA)),
                r.clamp(-HUBER_DELTA, HUBER_DELTA),
            ),
            _ => (f64::from(0.5 * r * r), r),
        }
    }
}

/// Linear learner trained by SGD.
#[derive(Debug, Clone, Default)]
pub struct LinearLearner {
    hyperparameters: LinearHyperParameters,
}

impl LinearLearner {
    pub fn hyperparameters(&self) -> &LinearHyperParameters {
        &self.hyperparameters
    }
}

/// Training data encoded the way the reference engine encodes it.
struct EncodedData {
    num_features: usize,
    x: Vec<f32>,
    /// Class index, binary outcome or numerical target.
    targets: Vec<f32>,
    /// Head trained by each example (uplift arm; 0 otherwise).
    arms: Vec<usize>,
    weights: Vec<f32>,
}

impl EncodedData {
    fn len(&self) -> usize {
        self.targets.len()
    }

    fn row(&self, e: usize) -> &[f32] {
        &self.x[e * self.num_features..(e + 1) * self.num_features]
    }
}

/// Labels, treatments and features resolved from the training data.
struct Layout {
    task: Task,
    features: Vec<InputFeature>,
    classes: Vec<String>,
    treatments: Vec<String>,
}

fn sorted_distinct(values: &[Option<String>]) -> Vec<String> {
    values
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn build_feature(dataset: &Dataset, name: &str) -> Result<InputFeature, MlError> {
    let column = dataset.require_column(name)?;
    let (encoding, is_text) = match &column.data {
        ColumnData::Numerical(values) => {
            let present: Vec<f64> = values.iter().flatten().map(|&v| f64::from(v)).collect();
            let (mean, std_dev) = if present.is_empty() {
                (0.0, 1.0)
            } else {
                let n = present.len() as f64;
                let mean = present.iter().sum::<f64>() / n;
                let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > 1e-12 { std } else { 1.0 })
            };
            (
                FeatureEncoding::Numerical {
                    mean: mean as f32,
                    std_dev: std_dev as f32,
                },
                false,
            )
        }
        ColumnData::Categorical(values) | ColumnData::Text(values) => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in values.iter().flatten() {
                *counts.entry(v.as_str()).or_default() += 1;
            }
            let mut vocabulary: Vec<(&str, usize)> = counts.into_iter().collect();
            vocabulary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            vocabulary.truncate(MAX_VOCABULARY_SIZE);
            (
                FeatureEncoding::Categorical {
                    vocabulary: vocabulary.into_iter().map(|(v, _)| v.to_string()).collect(),
                },
                matches!(column.data, ColumnData::Text(_)),
            )
        }
    };
    Ok(InputFeature {
        name: name.to_string(),
        encoding,
        is_text,
    })
}

impl Layout {
    fn resolve(config: &TrainingConfig, features: &[String], train: &Dataset) -> Result<Self, MlError> {
        let features = features
            .iter()
            .map(|name| build_feature(train, name))
            .collect::<Result<Vec<_>, _>>()?;

        let classes = match config.task {
            Task::Classification | Task::CategoricalUplift => {
                sorted_distinct(train.categorical(&config.label)?)
            }
            _ => Vec::new(),
        };
        match config.task {
            Task::Classification if classes.len() < 2 => {
                return Err(MlError::training(format!(
                    "label \"{}\" has {} distinct values, classification needs at least 2",
                    config.label,
                    classes.len()
                )));
            }
            Task::CategoricalUplift if classes.len() != 2 => {
                return Err(MlError::training(format!(
                    "categorical uplift needs a binary label, \"{}\" has {} values",
                    config.label,
                    classes.len()
                )));
            }
            _ => {}
        }

        let treatments = match (&config.uplift_treatment, config.task.is_uplift()) {
            (Some(treatment), true) => {
                let treatments = sorted_distinct(train.categorical(treatment)?);
                if treatments.len() != 2 {
                    return Err(MlError::training(format!(
                        "uplift needs exactly one control and one treatment value in \"{treatment}\", found {treatments:?}"
                    )));
                }
                treatments
            }
            _ => Vec::new(),
        };

        Ok(Self {
            task: config.task,
            features,
            classes,
            treatments,
        })
    }

    fn num_heads(&self) -> usize {
        match self.task {
            Task::Classification => self.classes.len(),
            Task::Regression | Task::Ranking => 1,
            Task::CategoricalUplift | Task::NumericalUplift => 2,
        }
    }

    /// Encode the usable rows of `dataset`: rows with a missing label (or
    /// treatment) are skipped.
    fn encode(&self, config: &TrainingConfig, dataset: &Dataset) -> Result<EncodedData, MlError> {
        let columns = self
            .features
            .iter()
            .map(|f| {
                dataset
                    .column_index(&f.name)
                    .ok_or_else(|| MlError::dataset(format!("column \"{}\" not found", f.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let targets: Vec<Option<f32>> = match self.task {
            Task::Classification => dataset
                .categorical(&config.label)?
                .iter()
                .map(|v| {
                    v.as_ref()
                        .and_then(|v| self.classes.iter().position(|c| c == v))
                        .map(|i| i as f32)
                })
                .collect(),
            Task::CategoricalUplift => dataset
                .categorical(&config.label)?
                .iter()
                .map(|v| v.as_ref().map(|v| if *v == self.classes[1] { 1.0 } else { 0.0 }))
                .collect(),
            Task::Regression | Task::Ranking | Task::NumericalUplift => {
                dataset.numerical(&config.label)?.to_vec()
            }
        };

        let arms: Vec<Option<usize>> = match &config.uplift_treatment {
            Some(treatment) if self.task.is_uplift() => dataset
                .categorical(treatment)?
                .iter()
                .map(|v| v.as_ref().and_then(|v| self.treatments.iter().position(|t| t == v)))
                .collect(),
            _ => vec![Some(0); dataset.nrow()],
        };

        let weights: Vec<f32> = match &config.weight {
            Some(weight) => {
                let weights = dataset.numerical(weight)?;
                if weights.iter().flatten().any(|&w| w < 0.0) {
                    return Err(MlError::training(format!(
                        "weight column \"{weight}\" has negative values"
                    )));
                }
                weights.iter().map(|w| w.unwrap_or(0.0)).collect()
            }
            None => vec![1.0; dataset.nrow()],
        };

        let mut data = EncodedData {
            num_features: self.features.len(),
            x: Vec::new(),
            targets: Vec::new(),
            arms: Vec::new(),
            weights: Vec::new(),
        };
        for row in 0..dataset.nrow() {
            let (Some(target), Some(arm)) = (targets[row], arms[row]) else {
                continue;
            };
            for (feature, &col) in self.features.iter().zip(&columns) {
                data.x.push(feature.encode(&dataset.value(row, col))?);
            }
            data.targets.push(target);
            data.arms.push(arm);
            data.weights.push(weights[row]);
        }

        // Normalize weights to a mean of 1 so the learning rate keeps its scale.
        let total: f32 = data.weights.iter().sum();
        if data.len() > 0 && total <= 0.0 {
            return Err(MlError::training("all example weights are zero"));
        }
        let mean = total / data.len().max(1) as f32;
        if mean > 0.0 {
            data.weights.iter_mut().for_each(|w| *w /= mean);
        }
        Ok(data)
    }

    fn initial_heads(&self, data: &EncodedData) -> Vec<Head> {
        let categorical = matches!(self.task, Task::Classification | Task::CategoricalUplift);
        (0..self.num_heads())
            .map(|h| {
                let bias = if categorical {
                    0.0
                } else {
                    let (sum, count) = (0..data.len())
                        .filter(|&e| data.arms[e] == h)
                        .fold((0.0f64, 0.0f64), |(s, c), e| {
                            let w = f64::from(data.weights[e]);
                            (s + w * f64::from(data.targets[e]), c + w)
                        });
                    if count > 0.0 { (sum / count) as f32 } else { 0.0 }
                };
                Head::zeros(&self.features, bias)
            })
            .collect()
    }

    /// Loss of example `e` and the score gradient of every head.
    fn loss_and_gradients(
        &self,
        loss: Loss,
        heads: &[Head],
        data: &EncodedData,
        e: usize,
        gradients: &mut [f32],
    ) -> f64 {
        let x = data.row(e);
        let scores: Vec<f32> = heads
            .iter()
            .map(|head| head.score(&self.features, |f| x[f]))
            .collect();
        let target = data.targets[e];
        gradients.iter_mut().for_each(|g| *g = 0.0);
        match self.task {
            Task::Classification => {
                let y = target as usize;
                let probabilities = softmax(&scores);
                for (h, (g, p)) in gradients.iter_mut().zip(&probabilities).enumerate() {
                    *g = p - if h == y { 1.0 } else { 0.0 };
                }
                -f64::from(probabilities[y].max(1e-7)).ln()
            }
            Task::CategoricalUplift => {
                let arm = data.arms[e];
                let p = sigmoid(scores[arm]);
                gradients[arm] = p - target;
                let p = f64::from(p.clamp(1e-7, 1.0 - 1e-7));
                if target > 0.5 { -p.ln() } else { -(1.0 - p).ln() }
            }
            Task::Regression | Task::Ranking | Task::NumericalUplift => {
                let arm = data.arms[e];
                let (value, gradient) = loss.regression(scores[arm], target);
                gradients[arm] = gradient;
                value
            }
        }
    }

    fn mean_loss(&self, loss: Loss, heads: &[Head], data: &EncodedData) -> f64 {
        let mut gradients = vec![0.0; heads.len()];
        let (sum, weight) = (0..data.len()).fold((0.0, 0.0), |(s, w), e| {
            let we = f64::from(data.weights[e]);
            (s + we * self.loss_and_gradients(loss, heads, data, e, &mut gradients), w + we)
        });
        if weight > 0.0 { sum / weight } else { 0.0 }
    }
}

impl Learner for LinearLearner {
    fn name(&self) -> &str {
        LINEAR_LEARNER_NAME
    }

    fn set_hyperparameters(&mut self, hyperparameters: &HyperParameters) -> Result<(), MlError> {
        for (name, value) in hyperparameters {
            self.hyperparameters.apply(name, value)?;
        }
        Ok(())
    }

    fn predefined_hyperparameters(&self) -> Vec<HyperParameterPreset> {
        let preset = |name: &str, parameters: &[(&str, HyperParameterValue)]| HyperParameterPreset {
            name: name.to_string(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        vec![
            preset(
                "fast@v1",
                &[
                    ("num_epochs", HyperParameterValue::Integer(5)),
                    ("learning_rate", HyperParameterValue::Real(0.1)),
                ],
            ),
            preset(
                "regularized@v1",
                &[("l2_regularization", HyperParameterValue::Real(1e-3))],
            ),
            preset(
                "long@v1",
                &[
                    ("num_epochs", HyperParameterValue::Integer(50)),
                    ("learning_rate", HyperParameterValue::Real(0.02)),
                ],
            ),
        ]
    }

    fn train(&self, request: TrainingRequest<'_>) -> Result<Box<dyn Model>, MlError> {
        let start = Instant::now();
        let config = request.config;
        let hp = &self.hyperparameters;
        let loss = Loss::resolve(config.task, config.loss.as_deref())?;

        let train = request.train.load(request.spec)?;
        let valid = request
            .valid
            .as_ref()
            .map(|v| v.load(request.spec))
            .transpose()?;

        let layout = Layout::resolve(config, &config.input_features(request.spec), &train)?;
        let train_data = layout.encode(config, &train)?;
        if train_data.len() == 0 {
            return Err(MlError::training("no training example has a label"));
        }
        let valid_data = valid
            .as_ref()
            .map(|v| layout.encode(config, v))
            .transpose()?
            .filter(|d| d.len() > 0);

        let mut heads = layout.initial_heads(&train_data);
        let mut best_heads = heads.clone();
        let mut metrics = TrainingMetrics::default();
        let mut callbacks: Vec<Box<dyn TrainingCallback>> =
            vec![Box::new(DeadlineCallback::new(request.stop.clone()))];
        if hp.early_stopping_patience > 0 {
            callbacks.push(Box::new(EarlyStoppingCallback::new(
                hp.early_stopping_patience,
                0.0,
            )));
        }

        let lr = hp.learning_rate as f32;
        let l2 = hp.l2_regularization as f32;
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let mut order: Vec<usize> = (0..train_data.len()).collect();
        let mut gradients = vec![0.0f32; heads.len()];

        for epoch in 1..=hp.num_epochs {
            order.shuffle(&mut rng);
            for &e in &order {
                layout.loss_and_gradients(loss, &heads, &train_data, e, &mut gradients);
                let step = lr * train_data.weights[e];
                let x = train_data.row(e);
                for (head, &g) in heads.iter_mut().zip(&gradients) {
                    if g == 0.0 {
                        continue;
                    }
                    head.bias -= step * g;
                    for ((feature, w), &v) in layout.features.iter().zip(&mut head.weights).zip(x) {
                        match feature.encoding {
                            FeatureEncoding::Numerical { .. } => {
                                w[0] -= step * g * v + lr * l2 * w[0];
                            }
                            FeatureEncoding::Categorical { .. } => {
                                let i = v as usize;
                                w[i] -= step * g + lr * l2 * w[i];
                            }
                        }
                    }
                }
            }

            let train_loss = layout.mean_loss(loss, &heads, &train_data);
            let valid_loss = valid_data
                .as_ref()
                .map(|d| layout.mean_loss(loss, &heads, d));
            metrics.record_epoch(train_loss, valid_loss);
            if metrics.last_is_best() {
                best_heads.clone_from(&heads);
            }
            debug!(epoch, train_loss, ?valid_loss, "Epoch done");

            let mut stop = false;
            for callback in &mut callbacks {
                stop |= callback.on_epoch_end(epoch, &metrics) == CallbackAction::Stop;
            }
            if stop {
                break;
            }
        }

        let interrupted = request.stop.is_raised();
        info!(
            epochs = metrics.epochs_completed,
            best_epoch = ?metrics.best_epoch,
            best_loss = ?metrics.best_loss,
            interrupted,
            "Linear model trained"
        );

        let model = LinearModel {
            task: config.task,
            label: config.label.clone(),
            classes: layout.classes,
            treatment: config
                .uplift_treatment
                .clone()
                .filter(|_| config.task.is_uplift()),
            treatments: layout.treatments,
            features: layout.features,
            heads: best_heads,
            metadata: ModelMetadata {
                learner: LINEAR_LEARNER_NAME.to_string(),
                created_at: Utc::now(),
                training_duration_secs: start.elapsed().as_secs_f64(),
                seed: config.random_seed,
                epochs_completed: metrics.epochs_completed,
                interrupted,
            },
        };
        model.validate()?;
        Ok(Box::new(model))
    }
}
