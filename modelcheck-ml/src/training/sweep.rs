//! Runs every predefined hyperparameter set of a learner through training,
//! post-training checks and evaluation.

use crate::config::EquivalenceConfig;
use crate::data::dataset::Dataset;
use crate::data::format::{TypedPath, read_dataset, read_raw};
use crate::data::schema::{DataSpecification, DataSpecificationGuide};
use crate::data::split::split_indices;
use crate::data::synthetic::{
    self, GROUP_COLUMN, LABEL_COLUMN, SyntheticDatasetOptions, SyntheticTask,
};
use crate::error::MlError;
use crate::evaluation::{EvaluationOptions, EvaluationResult, Evaluator, StandardEvaluator};
use crate::model::{ModelLoaderRegistry, Task};
use crate::training::config::{HyperParameterPreset, HyperParameters, TrainingConfig};
use crate::training::learner::DatasetInput;
use crate::training::orchestrator::{TrainingOrchestrator, TrainingRun};
use crate::verify::{
    VerificationFailure, VerificationReport, check_engine_equivalence,
    check_serialization_roundtrip,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{info, warn};

/// Data of a sweep.
#[derive(Debug, Clone)]
pub enum SweepData<'a> {
    /// Files; the learner reads the training file itself.
    Paths { train: TypedPath, test: TypedPath },
    InMemory { train: &'a Dataset, test: &'a Dataset },
}

/// Settings shared by every trial.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub guide: DataSpecificationGuide,
    pub equivalence: EquivalenceConfig,
    /// Round-trip every trained model through both serialized forms.
    pub check_serialization: bool,
    pub evaluation: EvaluationOptions,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            guide: DataSpecificationGuide::default(),
            equivalence: EquivalenceConfig::default(),
            check_serialization: true,
            evaluation: EvaluationOptions::default(),
        }
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TrialStatus {
    Succeeded,
    Failed(String),
}

/// A single sweep trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTrial {
    pub trial_number: usize,
    pub preset: String,
    pub params: HyperParameters,
    /// Primary metric of the task on the test data.
    pub metric: Option<f64>,
    pub status: TrialStatus,
}

/// All trials of a sweep over predefined hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparamSweep {
    pub id: String,
    pub learner: String,
    pub trials: Vec<SweepTrial>,
    pub best_trial: Option<usize>,
}

fn primary_metric(task: Task, evaluation: &EvaluationResult) -> Option<f64> {
    match task {
        Task::Classification => evaluation.accuracy,
        Task::Regression => evaluation.rmse,
        Task::Ranking => evaluation.ndcg,
        Task::CategoricalUplift | Task::NumericalUplift => evaluation.mean_uplift,
    }
}

impl HyperparamSweep {
    fn new(learner: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner: learner.to_string(),
            trials: Vec::new(),
            best_trial: None,
        }
    }

    fn select_best(&mut self, task: Task) {
        let lower_is_better = task == Task::Regression;
        self.best_trial = self
            .trials
            .iter()
            .filter(|t| t.status == TrialStatus::Succeeded)
            .filter_map(|t| t.metric.map(|m| (t.trial_number, m)))
            .max_by(|a, b| {
                if lower_is_better {
                    b.1.total_cmp(&a.1)
                } else {
                    a.1.total_cmp(&b.1)
                }
            })
            .map(|(n, _)| n);
    }
}

struct Trial<'a> {
    orchestrator: &'a TrainingOrchestrator,
    loaders: &'a ModelLoaderRegistry,
    spec: &'a DataSpecification,
    train: DatasetInput<'a>,
    test: &'a Dataset,
    options: &'a SweepOptions,
}

impl Trial<'_> {
    /// Train with `preset` and check the model. Returns the evaluation and the
    /// check failures.
    fn run(
        &self,
        base_config: &TrainingConfig,
        preset: &HyperParameterPreset,
    ) -> Result<(EvaluationResult, VerificationReport), MlError> {
        let mut config = base_config.clone();
        config.hyperparameters.extend(preset.parameters.clone());
        let trained = self
            .orchestrator
            .train(TrainingRun::new(config, self.spec, self.train.clone()))?;
        let model = trained.model.as_ref();

        let mut report = check_engine_equivalence(model, self.test, &self.options.equivalence)?;
        if self.options.check_serialization {
            let scratch = tempfile::TempDir::new()?;
            report.merge(check_serialization_roundtrip(
                model,
                self.loaders,
                self.test,
                scratch.path(),
                self.options.equivalence.batch_size,
            )?);
        }
        let evaluation = StandardEvaluator.evaluate(model, self.test, &self.options.evaluation)?;
        Ok((evaluation, report))
    }
}

/// Train, check and evaluate every predefined hyperparameter set of the learner
/// named in `base_config`.
///
/// Fails with a verification error when the learner does not publish exactly
/// `expected_count` sets, when a trial fails or does not pass its checks, or
/// when a trial's accuracy is below `min_accuracy`.
pub fn run_predefined_hyperparameters(
    orchestrator: &TrainingOrchestrator,
    base_config: &TrainingConfig,
    data: SweepData<'_>,
    expected_count: usize,
    min_accuracy: Option<f64>,
    options: &SweepOptions,
) -> Result<HyperparamSweep, MlError> {
    run_predefined_hyperparameters_with_loaders(
        orchestrator,
        &ModelLoaderRegistry::with_defaults(),
        base_config,
        data,
        expected_count,
        min_accuracy,
        options,
    )
}

/// [`run_predefined_hyperparameters`] reloading serialized models through `loaders`.
pub fn run_predefined_hyperparameters_with_loaders(
    orchestrator: &TrainingOrchestrator,
    loaders: &ModelLoaderRegistry,
    base_config: &TrainingConfig,
    data: SweepData<'_>,
    expected_count: usize,
    min_accuracy: Option<f64>,
    options: &SweepOptions,
) -> Result<HyperparamSweep, MlError> {
    if min_accuracy.is_some() && base_config.task != Task::Classification {
        return Err(MlError::config(format!(
            "an accuracy floor only applies to classification, not {}",
            base_config.task
        )));
    }
    let presets = orchestrator
        .registry()
        .create(&base_config.learner)?
        .predefined_hyperparameters();

    let (spec, train, test): (DataSpecification, DatasetInput<'_>, Cow<'_, Dataset>) = match data {
        SweepData::Paths { train, test } => {
            let spec = DataSpecification::infer(&read_raw(&train)?, &options.guide)?;
            let test = read_dataset(&test, &spec)?;
            (spec, DatasetInput::Path(train), Cow::Owned(test))
        }
        SweepData::InMemory { train, test } => (
            DataSpecification::from_dataset(train),
            DatasetInput::InMemory(train),
            Cow::Borrowed(test),
        ),
    };

    let mut evaluation = options.evaluation.clone();
    if evaluation.ranking_group.is_none() {
        evaluation.ranking_group = base_config.ranking_group.clone();
    }
    let options = SweepOptions {
        evaluation,
        ..options.clone()
    };
    let trial = Trial {
        orchestrator,
        loaders,
        spec: &spec,
        train,
        test: &test,
        options: &options,
    };

    let mut sweep = HyperparamSweep::new(&base_config.learner);
    let mut report = VerificationReport::new();
    if presets.len() != expected_count {
        report.push(VerificationFailure::PresetCount {
            expected: expected_count,
            actual: presets.len(),
        });
    }

    for (trial_number, preset) in presets.iter().enumerate() {
        info!(learner = %base_config.learner, preset = %preset.name, "Running preset");
        let (metric, status) = match trial.run(base_config, preset) {
            Ok((result, checks)) => {
                let metric = primary_metric(base_config.task, &result);
                if let (Some(floor), Some(accuracy)) = (min_accuracy, result.accuracy) {
                    if accuracy < floor {
                        report.push(VerificationFailure::PresetAccuracy {
                            preset: preset.name.clone(),
                            accuracy,
                            min_accuracy: floor,
                        });
                    }
                }
                let status = if checks.is_ok() {
                    TrialStatus::Succeeded
                } else {
                    TrialStatus::Failed(checks.to_string())
                };
                report.merge(checks);
                (metric, status)
            }
            Err(e) => {
                warn!(preset = %preset.name, error = %e, "Preset failed");
                report.push(VerificationFailure::PresetFailed {
                    preset: preset.name.clone(),
                    message: e.to_string(),
                });
                (None, TrialStatus::Failed(e.to_string()))
            }
        };
        sweep.trials.push(SweepTrial {
            trial_number,
            preset: preset.name.clone(),
            params: preset.parameters.clone(),
            metric,
            status,
        });
    }
    sweep.select_best(base_config.task);
    info!(
        sweep = %sweep.id,
        trials = sweep.trials.len(),
        best_trial = ?sweep.best_trial,
        failures = report.failures.len(),
        "Predefined hyperparameter sweep done"
    );
    report.into_result()?;
    Ok(sweep)
}

/// Examples in the synthetic ranking dataset of
/// [`run_predefined_hyperparameters_on_synthetic_ranking`].
pub const SYNTHETIC_RANKING_EXAMPLES: usize = 400;

/// Documents per query group in that dataset.
pub const SYNTHETIC_RANKING_GROUP_SIZE: usize = 10;

/// Sweep the predefined hyperparameters of `base_config`'s learner over the
/// synthetic ranking dataset, split even/odd into train and test.
///
/// The task, label and ranking group of `base_config` are replaced by those of
/// the synthetic data.
pub fn run_predefined_hyperparameters_on_synthetic_ranking(
    orchestrator: &TrainingOrchestrator,
    base_config: &TrainingConfig,
    expected_count: usize,
    options: &SweepOptions,
) -> Result<HyperparamSweep, MlError> {
    let dataset = synthetic::generate(&SyntheticDatasetOptions {
        num_examples: SYNTHETIC_RANKING_EXAMPLES,
        task: SyntheticTask::Ranking {
            group_size: SYNTHETIC_RANKING_GROUP_SIZE,
        },
        ..Default::default()
    })?;
    let split = split_indices(dataset.nrow(), 0.5, false, None)?;
    let train = dataset.extract_rows(&split.train)?;
    let test = dataset.extract_rows(&split.test)?;

    let mut config = base_config.clone();
    config.task = Task::Ranking;
    config.label = LABEL_COLUMN.to_string();
    config.ranking_group = Some(GROUP_COLUMN.to_string());
    config.uplift_treatment = None;
    run_predefined_hyperparameters(
        orchestrator,
        &config,
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        expected_count,
        None,
        options,
    )
}
