//! Model evaluation: accuracy, log loss, RMSE, NDCG@5 and mean uplift.

use crate::data::dataset::Dataset;
use crate::error::MlError;
use crate::model::{Model, Prediction, Task, predict_dataset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Truncation of the NDCG metric.
pub const NDCG_TRUNCATION: usize = 5;

/// Probability floor used by the log loss.
const MIN_PROBABILITY: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Evaluate as this task instead of the model's own.
    #[serde(default)]
    pub task_override: Option<Task>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub weight_column: Option<String>,
    /// Query column of ranking evaluations.
    #[serde(default)]
    pub ranking_group: Option<String>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            task_override: None,
            batch_size: default_batch_size(),
            weight_column: None,
            ranking_group: None,
        }
    }
}

fn default_batch_size() -> usize {
    256
}

/// Aggregated metrics. Only the metrics of the evaluated task are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub task: Task,
    pub num_examples: usize,
    pub sum_weights: f64,
    pub accuracy: Option<f64>,
    pub log_loss: Option<f64>,
    pub rmse: Option<f64>,
    pub ndcg: Option<f64>,
    pub mean_uplift: Option<f64>,
}

impl EvaluationResult {
    fn empty(task: Task) -> Self {
        Self {
            task,
            num_examples: 0,
            sum_weights: 0.0,
            accuracy: None,
            log_loss: None,
            rmse: None,
            ndcg: None,
            mean_uplift: None,
        }
    }

    /// Metric by name (`accuracy`, `log_loss`, `rmse`, `ndcg`, `mean_uplift`).
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "accuracy" => self.accuracy,
            "log_loss" => self.log_loss,
            "rmse" => self.rmse,
            "ndcg" => self.ndcg,
            "mean_uplift" => self.mean_uplift,
            _ => None,
        }
    }
}

/// Computes evaluation metrics of a model on a dataset.
pub trait Evaluator {
    fn evaluate(
        &self,
        model: &dyn Model,
        dataset: &Dataset,
        options: &EvaluationOptions,
    ) -> Result<EvaluationResult, MlError>;
}

/// Evaluator running the reference engine of the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvaluator;

fn example_weights(dataset: &Dataset, options: &EvaluationOptions) -> Result<Vec<f64>, MlError> {
    match &options.weight_column {
        Some(column) => Ok(dataset
            .numerical(column)?
            .iter()
            .map(|w| w.map_or(0.0, f64::from))
            .collect()),
        None => Ok(vec![1.0; dataset.nrow()]),
    }
}

fn scalar(prediction: &Prediction) -> Result<f64, MlError> {
    match prediction {
        Prediction::Regression { value } => Ok(f64::from(*value)),
        Prediction::Ranking { relevance } => Ok(f64::from(*relevance)),
        other => Err(MlError::config(format!("cannot evaluate {other} as a scalar"))),
    }
}

fn evaluate_classification(
    model: &dyn Model,
    dataset: &Dataset,
    predictions: &[Prediction],
    weights: &[f64],
    result: &mut EvaluationResult,
) -> Result<(), MlError> {
    let labels = dataset.categorical(model.label())?;
    let classes = model.label_classes();
    let (mut correct, mut loss) = (0.0, 0.0);
    for ((label, prediction), &w) in labels.iter().zip(predictions).zip(weights) {
        let Some(label) = label else { continue };
        let Prediction::Classification { probabilities } = prediction else {
            return Err(MlError::config(format!(
                "cannot evaluate {prediction} as a classification"
            )));
        };
        let predicted = probabilities
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })
            .map(|(i, _)| i);
        let truth = classes.iter().position(|c| c == label);
        if truth.is_some() && predicted == truth {
            correct += w;
        }
        let p = truth
            .and_then(|t| probabilities.get(t))
            .map_or(0.0, |&p| f64::from(p));
        loss -= w * p.max(MIN_PROBABILITY).ln();
        result.num_examples += 1;
        result.sum_weights += w;
    }
    if result.sum_weights > 0.0 {
        result.accuracy = Some(correct / result.sum_weights);
        result.log_loss = Some(loss / result.sum_weights);
    }
    Ok(())
}

fn evaluate_regression(
    model: &dyn Model,
    dataset: &Dataset,
    predictions: &[Prediction],
    weights: &[f64],
    result: &mut EvaluationResult,
) -> Result<(), MlError> {
    let labels = dataset.numerical(model.label())?;
    let mut squared = 0.0;
    for ((label, prediction), &w) in labels.iter().zip(predictions).zip(weights) {
        let Some(label) = label else { continue };
        squared += w * (scalar(prediction)? - f64::from(*label)).powi(2);
        result.num_examples += 1;
        result.sum_weights += w;
    }
    if result.sum_weights > 0.0 {
        result.rmse = Some((squared / result.sum_weights).sqrt());
    }
    Ok(())
}

/// DCG of relevances in the given order, truncated.
fn dcg(relevances: impl Iterator<Item = f64>) -> f64 {
    relevances
        .take(NDCG_TRUNCATION)
        .enumerate()
        .map(|(i, rel)| (2f64.powf(rel) - 1.0) / ((i + 2) as f64).log2())
        .sum()
}

fn evaluate_ranking(
    model: &dyn Model,
    dataset: &Dataset,
    predictions: &[Prediction],
    weights: &[f64],
    options: &EvaluationOptions,
    result: &mut EvaluationResult,
) -> Result<(), MlError> {
    let group_column = options
        .ranking_group
        .as_deref()
        .ok_or_else(|| MlError::config("ranking evaluation requires a ranking group column"))?;
    let groups = dataset.categorical(group_column)?;
    let labels = dataset.numerical(model.label())?;

    // Rows of each group, in order of first appearance.
    let mut order: Vec<&str> = Vec::new();
    let mut members: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for (row, prediction) in predictions.iter().enumerate() {
        let (Some(group), Some(label)) = (&groups[row], labels[row]) else {
            continue;
        };
        let entry = members.entry(group.as_str()).or_insert_with(|| {
            order.push(group.as_str());
            Vec::new()
        });
        entry.push((scalar(prediction)?, f64::from(label)));
        result.num_examples += 1;
    }

    let (mut total, mut total_weight) = (0.0, 0.0);
    for group in order {
        let mut items = members.remove(group).unwrap_or_default();
        let mut ideal: Vec<f64> = items.iter().map(|(_, rel)| *rel).collect();
        ideal.sort_by(|a, b| b.total_cmp(a));
        let ideal_dcg = dcg(ideal.into_iter());
        if ideal_dcg <= 0.0 {
            continue;
        }
        items.sort_by(|a, b| b.0.total_cmp(&a.0));
        let w = groups
            .iter()
            .position(|g| g.as_deref() == Some(group))
            .map_or(1.0, |row| weights[row]);
        total += w * dcg(items.iter().map(|(_, rel)| *rel)) / ideal_dcg;
        total_weight += w;
    }
    result.sum_weights = total_weight;
    if total_weight > 0.0 {
        result.ndcg = Some(total / total_weight);
    }
    Ok(())
}

fn evaluate_uplift(
    predictions: &[Prediction],
    weights: &[f64],
    result: &mut EvaluationResult,
) -> Result<(), MlError> {
    let mut sum = 0.0;
    for (prediction, &w) in predictions.iter().zip(weights) {
        let Prediction::Uplift { treatment_effect } = prediction else {
            return Err(MlError::config(format!("cannot evaluate {prediction} as an uplift")));
        };
        let effect = treatment_effect.first().copied().unwrap_or(0.0);
        sum += w * f64::from(effect);
        result.num_examples += 1;
        result.sum_weights += w;
    }
    if result.sum_weights > 0.0 {
        result.mean_uplift = Some(sum / result.sum_weights);
    }
    Ok(())
}

impl Evaluator for StandardEvaluator {
    fn evaluate(
        &self,
        model: &dyn Model,
        dataset: &Dataset,
        options: &EvaluationOptions,
    ) -> Result<EvaluationResult, MlError> {
        let task = options.task_override.unwrap_or(model.task());
        let predictions = predict_dataset(model.reference_engine().as_ref(), dataset, options.batch_size)?;
        let weights = example_weights(dataset, options)?;
        let mut result = EvaluationResult::empty(task);
        match task {
            Task::Classification => {
                evaluate_classification(model, dataset, &predictions, &weights, &mut result)?
            }
            Task::Regression => {
                evaluate_regression(model, dataset, &predictions, &weights, &mut result)?
            }
            Task::Ranking => evaluate_ranking(
                model,
                dataset,
                &predictions,
                &weights,
                options,
                &mut result,
            )?,
            Task::CategoricalUplift | Task::NumericalUplift => {
                evaluate_uplift(&predictions, &weights, &mut result)?
            }
        }
        info!(
            %task,
            num_examples = result.num_examples,
            accuracy = ?result.accuracy,
            rmse = ?result.rmse,
            ndcg = ?result.ndcg,
            mean_uplift = ?result.mean_uplift,
            "Evaluation done"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::toy_dataset;
    use crate::linear::model::tests::toy_model;

    #[test]
    fn test_dcg_of_perfect_order() {
        let value = dcg([3.0, 1.0].into_iter());
        assert!((value - (7.0 + 1.0 / 3f64.log2())).abs() < 1e-12);
    }

    #[test]
    fn test_classification_metrics() {
        let result = StandardEvaluator
            .evaluate(&toy_model(), &toy_dataset(), &EvaluationOptions::default())
            .unwrap();
        assert_eq!(result.num_examples, 4);
        let accuracy = result.accuracy.unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(result.log_loss.unwrap() > 0.0);
        assert!(result.rmse.is_none());
        assert_eq!(result.metric("accuracy"), result.accuracy);
    }

    #[test]
    fn test_ranking_needs_group() {
        let options = EvaluationOptions {
            task_override: Some(Task::Ranking),
            ..Default::default()
        };
        let err = StandardEvaluator
            .evaluate(&toy_model(), &toy_dataset(), &options)
            .unwrap_err();
        assert!(err.is_config());
    }
}
