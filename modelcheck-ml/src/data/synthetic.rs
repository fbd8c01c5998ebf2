//! Reproducible synthetic dataset generation.
//!
//! Labels come from a hidden random linear model over the generated features,
//! so learners have a real signal to fit. The same options always yield the
//! same dataset.

use crate::data::dataset::{Column, ColumnData, Dataset};
use crate::error::MlError;
use crate::model::Task;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const LABEL_COLUMN: &str = "LABEL";
pub const GROUP_COLUMN: &str = "GROUP";
pub const TREATMENT_COLUMN: &str = "TREATMENT";

/// Kind of label produced by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticTask {
    Classification { num_classes: usize },
    Regression,
    Ranking { group_size: usize },
    Uplift,
}

impl SyntheticTask {
    /// Task a learner should be configured with for this data.
    pub fn task(&self) -> Task {
        match self {
            Self::Classification { .. } => Task::Classification,
            Self::Regression => Task::Regression,
            Self::Ranking { .. } => Task::Ranking,
            Self::Uplift => Task::NumericalUplift,
        }
    }
}

/// Declarative description of a synthetic dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDatasetOptions {
    #[serde(default = "default_num_examples")]
    pub num_examples: usize,
    #[serde(default = "default_num_numerical")]
    pub num_numerical: usize,
    #[serde(default = "default_num_categorical")]
    pub num_categorical: usize,
    #[serde(default)]
    pub num_text: usize,
    #[serde(default = "default_vocab_size")]
    pub categorical_vocab_size: usize,
    /// Probability that a feature cell is missing.
    #[serde(default)]
    pub missing_ratio: f64,
    /// Standard deviation of the noise added to the hidden score.
    #[serde(default = "default_label_noise")]
    pub label_noise: f64,
    #[serde(default = "default_task")]
    pub task: SyntheticTask,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SyntheticDatasetOptions {
    fn default() -> Self {
        Self {
            num_examples: default_num_examples(),
            num_numerical: default_num_numerical(),
            num_categorical: default_num_categorical(),
            num_text: 0,
            categorical_vocab_size: default_vocab_size(),
            missing_ratio: 0.0,
            label_noise: default_label_noise(),
            task: default_task(),
            seed: default_seed(),
        }
    }
}

fn default_num_examples() -> usize {
    1000
}

fn default_num_numerical() -> usize {
    4
}

fn default_num_categorical() -> usize {
    2
}

fn default_vocab_size() -> usize {
    4
}

fn default_label_noise() -> f64 {
    0.1
}

fn default_task() -> SyntheticTask {
    SyntheticTask::Classification { num_classes: 2 }
}

fn default_seed() -> u64 {
    1234
}

fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Generate the dataset described by `options`.
pub fn generate(options: &SyntheticDatasetOptions) -> Result<Dataset, MlError> {
    let num_heads = match options.task {
        SyntheticTask::Classification { num_classes } if num_classes >= 2 => num_classes,
        SyntheticTask::Classification { num_classes } => {
            return Err(MlError::config(format!(
                "synthetic classification needs at least 2 classes, got {num_classes}"
            )));
        }
        SyntheticTask::Ranking { group_size: 0 } => {
            return Err(MlError::config("synthetic ranking needs a positive group size"));
        }
        _ => 1,
    };
    if options.num_categorical > 0 && options.categorical_vocab_size == 0 {
        return Err(MlError::config("categorical_vocab_size must be positive"));
    }
    if !(0.0..1.0).contains(&options.missing_ratio) {
        return Err(MlError::config("missing_ratio must be in [0, 1)"));
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let numerical_coefs: Vec<Vec<f64>> = (0..num_heads)
        .map(|_| (0..options.num_numerical).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let categorical_effects: Vec<Vec<Vec<f64>>> = (0..num_heads)
        .map(|_| {
            (0..options.num_categorical)
                .map(|_| {
                    (0..options.categorical_vocab_size)
                        .map(|_| rng.gen_range(-1.0..1.0))
                        .collect()
                })
                .collect()
        })
        .collect();

    let n = options.num_examples;
    let mut numerical = vec![Vec::with_capacity(n); options.num_numerical];
    let mut categorical = vec![Vec::with_capacity(n); options.num_categorical];
    let mut text = vec![Vec::with_capacity(n); options.num_text];
    let mut labels_num = Vec::with_capacity(n);
    let mut labels_cat = Vec::with_capacity(n);
    let mut groups = Vec::with_capacity(n);
    let mut treatments = Vec::with_capacity(n);

    for row in 0..n {
        let mut scores = vec![0.0f64; num_heads];
        let mut first_numerical = 0.0;
        for (j, column) in numerical.iter_mut().enumerate() {
            let x = normal(&mut rng);
            if j == 0 {
                first_numerical = x;
            }
            for (h, score) in scores.iter_mut().enumerate() {
                *score += numerical_coefs[h][j] * x;
            }
            let missing = rng.gen_bool(options.missing_ratio);
            column.push((!missing).then_some(x as f32));
        }
        for (j, column) in categorical.iter_mut().enumerate() {
            let k = rng.gen_range(0..options.categorical_vocab_size);
            for (h, score) in scores.iter_mut().enumerate() {
                *score += categorical_effects[h][j][k];
            }
            let missing = rng.gen_bool(options.missing_ratio);
            column.push((!missing).then(|| format!("v{k}")));
        }
        for column in text.iter_mut() {
            let a = rng.gen_range(0..10);
            let b = rng.gen_range(0..10);
            column.push(Some(format!("tok{a} tok{b}")));
        }

        match options.task {
            SyntheticTask::Classification { .. } => {
                let noisy: Vec<f64> = scores
                    .iter()
                    .map(|s| s + options.label_noise * normal(&mut rng))
                    .collect();
                let best = noisy
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(h, _)| h)
                    .unwrap_or(0);
                labels_cat.push(Some(format!("class_{best}")));
            }
            SyntheticTask::Regression => {
                let y = 10.0 * (scores[0] + options.label_noise * normal(&mut rng)) + 50.0;
                labels_num.push(Some(y as f32));
            }
            SyntheticTask::Ranking { group_size } => {
                let relevance =
                    (1.5 * scores[0] + 2.0 + options.label_noise * normal(&mut rng)).round();
                labels_num.push(Some(relevance.clamp(0.0, 4.0) as f32));
                groups.push(Some(format!("g{}", row / group_size)));
            }
            SyntheticTask::Uplift => {
                let treated = rng.gen_bool(0.5);
                let effect = if treated { 1.0 + 0.5 * first_numerical } else { 0.0 };
                let y = 0.5 * scores[0] + effect + options.label_noise * normal(&mut rng);
                labels_num.push(Some(y as f32));
                treatments.push(Some(if treated { "treatment" } else { "control" }.to_string()));
            }
        }
    }

    let mut columns = Vec::new();
    for (j, values) in numerical.into_iter().enumerate() {
        columns.push(Column::new(format!("num_{j}"), ColumnData::Numerical(values)));
    }
    for (j, values) in categorical.into_iter().enumerate() {
        columns.push(Column::new(format!("cat_{j}"), ColumnData::Categorical(values)));
    }
    for (j, values) in text.into_iter().enumerate() {
        columns.push(Column::new(format!("text_{j}"), ColumnData::Text(values)));
    }
    match options.task {
        SyntheticTask::Classification { .. } => {
            columns.push(Column::new(LABEL_COLUMN, ColumnData::Categorical(labels_cat)));
        }
        SyntheticTask::Regression => {
            columns.push(Column::new(LABEL_COLUMN, ColumnData::Numerical(labels_num)));
        }
        SyntheticTask::Ranking { .. } => {
            columns.push(Column::new(LABEL_COLUMN, ColumnData::Numerical(labels_num)));
            columns.push(Column::new(GROUP_COLUMN, ColumnData::Categorical(groups)));
        }
        SyntheticTask::Uplift => {
            columns.push(Column::new(LABEL_COLUMN, ColumnData::Numerical(labels_num)));
            columns.push(Column::new(TREATMENT_COLUMN, ColumnData::Categorical(treatments)));
        }
    }
    tracing::debug!(rows = n, seed = options.seed, "Generated synthetic dataset");
    Dataset::new(columns)
}
