//! End-to-end pipeline: prepare the data, train, evaluate, then check the
//! model through every way it can be used.
//!
//! ```text
//! train_and_evaluate_model := prepare_dataset + train_model + evaluate_model
//!                           + post_training_checks (when `check_model` is set)
//! ```
//!
//! A tester owns everything it creates. Scratch files (synthetic data, shards,
//! serialized models) live in a per-tester temporary directory removed on drop.

use crate::config::HarnessConfig;
use crate::data::format::{DatasetFormat, TypedPath, read_dataset, read_raw, write_dataset};
use crate::data::schema::{DataSpecification, DataSpecificationGuide};
use crate::data::shard::shard_dataset;
use crate::data::split::{sample_indices, split_indices};
use crate::data::synthetic::{
    self, GROUP_COLUMN, LABEL_COLUMN, SyntheticDatasetOptions, SyntheticTask, TREATMENT_COLUMN,
};
use crate::data::weights::emulate_weights_by_duplication;
use crate::data::{ColumnType, Dataset};
use crate::error::MlError;
use crate::evaluation::{EvaluationOptions, EvaluationResult, Evaluator, StandardEvaluator};
use crate::model::{Model, ModelLoaderRegistry, Task};
use crate::training::config::TrainingConfig;
use crate::training::learner::DatasetInput;
use crate::training::orchestrator::{PreStartHook, TrainingOrchestrator, TrainingRun};
use crate::verify::{
    GoldenModelChecker, VerificationReport, check_engine_equivalence, check_serialization_roundtrip,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Datasets produced by [`TrainAndTestTester::prepare_dataset`].
#[derive(Debug)]
struct PreparedData {
    spec: DataSpecification,
    train: Dataset,
    valid: Option<Dataset>,
    test: Dataset,
}

/// Train-and-test pipeline over one learner configuration.
///
/// Set the public fields, then call [`train_and_evaluate_model`] or the
/// individual steps.
///
/// [`train_and_evaluate_model`]: TrainAndTestTester::train_and_evaluate_model
#[derive(Debug)]
pub struct TrainAndTestTester {
    pub harness: HarnessConfig,
    pub train_config: TrainingConfig,
    /// Typed path of the dataset, relative to the dataset root. `None` generates
    /// a synthetic dataset.
    pub dataset_filename: Option<String>,
    /// Typed path of a separate test dataset. When set, the whole dataset trains.
    pub test_dataset_filename: Option<String>,
    /// Guide file relative to the dataset root, merged over `guide`.
    pub guide_filename: Option<String>,
    pub guide: DataSpecificationGuide,
    pub synthetic: SyntheticDatasetOptions,
    /// Name of the golden model. Defaults to the learner name.
    pub model_name: Option<String>,
    pub evaluation_options: EvaluationOptions,
    /// Evaluate as this task instead of the model's own.
    pub evaluation_override: Option<Task>,

    orchestrator: TrainingOrchestrator,
    loaders: ModelLoaderRegistry,
    test_dir: TempDir,

    data: Option<PreparedData>,
    model: Option<Box<dyn Model>>,
    evaluation: Option<EvaluationResult>,
    training_duration: Option<Duration>,
}

impl TrainAndTestTester {
    pub fn new(harness: HarnessConfig, train_config: TrainingConfig) -> Result<Self, MlError> {
        harness.validate()?;
        let test_dir = tempfile::Builder::new()
            .prefix(&format!("modelcheck_{}_", uuid::Uuid::new_v4().simple()))
            .tempdir()?;
        debug!(test_dir = %test_dir.path().display(), "Created test directory");
        Ok(Self {
            harness,
            train_config,
            dataset_filename: None,
            test_dataset_filename: None,
            guide_filename: None,
            guide: DataSpecificationGuide::default(),
            synthetic: SyntheticDatasetOptions::default(),
            model_name: None,
            evaluation_options: EvaluationOptions::default(),
            evaluation_override: None,
            orchestrator: TrainingOrchestrator::default(),
            loaders: ModelLoaderRegistry::with_defaults(),
            test_dir,
            data: None,
            model: None,
            evaluation: None,
            training_duration: None,
        })
    }

    pub fn with_orchestrator(mut self, orchestrator: TrainingOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_loaders(mut self, loaders: ModelLoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn test_dir(&self) -> &Path {
        self.test_dir.path()
    }

    pub fn dataspec(&self) -> Option<&DataSpecification> {
        self.data.as_ref().map(|d| &d.spec)
    }

    pub fn train_dataset(&self) -> Option<&Dataset> {
        self.data.as_ref().map(|d| &d.train)
    }

    pub fn valid_dataset(&self) -> Option<&Dataset> {
        self.data.as_ref().and_then(|d| d.valid.as_ref())
    }

    pub fn test_dataset(&self) -> Option<&Dataset> {
        self.data.as_ref().map(|d| &d.test)
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn training_duration(&self) -> Option<Duration> {
        self.training_duration
    }

    /// Switch to the synthetic dataset generator and point the training
    /// configuration at its columns.
    pub fn configure_for_synthetic_dataset(&mut self) {
        self.harness.use_synthetic_dataset = true;
        self.dataset_filename = None;
        self.test_dataset_filename = None;
        self.guide_filename = None;

        let config = &mut self.train_config;
        config.task = self.synthetic.task.task();
        config.label = LABEL_COLUMN.to_string();
        config.ranking_group = None;
        config.uplift_treatment = None;
        match self.synthetic.task {
            SyntheticTask::Ranking { .. } => config.ranking_group = Some(GROUP_COLUMN.to_string()),
            SyntheticTask::Uplift => config.uplift_treatment = Some(TREATMENT_COLUMN.to_string()),
            SyntheticTask::Classification { .. } | SyntheticTask::Regression => {}
        }
        for j in 0..self.synthetic.num_text {
            let column = format!("text_{j}");
            if !self.guide.column_guides.iter().any(|g| g.column_name == column) {
                self.guide = std::mem::take(&mut self.guide).with_column(column, ColumnType::Text);
            }
        }
    }

    /// Directory relative dataset paths are resolved against.
    ///
    /// Synthetic datasets are written to, and read from, the test directory.
    pub fn effective_dataset_root(&self) -> PathBuf {
        if self.uses_synthetic_dataset() {
            self.test_dir.path().to_path_buf()
        } else {
            self.harness.dataset_root_directory.clone()
        }
    }

    fn uses_synthetic_dataset(&self) -> bool {
        self.harness.use_synthetic_dataset || self.dataset_filename.is_none()
    }

    fn preferred_format(&self) -> Result<DatasetFormat, MlError> {
        DatasetFormat::parse(&self.harness.preferred_format)
    }

    fn resolve_path(&self, text: &str) -> Result<TypedPath, MlError> {
        let mut path = TypedPath::parse(text)?;
        if path.path.is_relative() {
            path.path = self.effective_dataset_root().join(&path.path);
        }
        Ok(path)
    }

    /// Typed path of the full dataset, generating it first in synthetic mode.
    fn dataset_path(&self) -> Result<TypedPath, MlError> {
        match &self.dataset_filename {
            Some(filename) if !self.harness.use_synthetic_dataset => self.resolve_path(filename),
            _ => {
                let format = self.preferred_format()?;
                let dataset = synthetic::generate(&self.synthetic)?;
                let file = self
                    .effective_dataset_root()
                    .join(format!("synthetic{}", format.extension()));
                write_dataset(&dataset, format, &file)?;
                info!(
                    rows = dataset.nrow(),
                    file = %file.display(),
                    "Wrote synthetic dataset"
                );
                Ok(TypedPath::new(format, file))
            }
        }
    }

    fn effective_guide(&self) -> Result<DataSpecificationGuide, MlError> {
        let mut guide = self.guide.clone();
        if let Some(filename) = &self.guide_filename {
            let loaded = DataSpecificationGuide::load(&self.effective_dataset_root().join(filename))?;
            guide.column_guides.extend(loaded.column_guides);
            guide.ignore_columns.extend(loaded.ignore_columns);
        }
        Ok(guide)
    }

    /// Build the data specification and the train, validation and test datasets.
    pub fn prepare_dataset(&mut self, weight_column: Option<&str>) -> Result<(), MlError> {
        self.prepare(weight_column, false)
    }

    fn prepare(&mut self, weight_column: Option<&str>, emulate_weights: bool) -> Result<(), MlError> {
        self.data = None;
        self.model = None;
        self.evaluation = None;

        let path = self.dataset_path()?;
        let guide = self.effective_guide()?;
        let raw = read_raw(&path)?;
        let spec = DataSpecification::infer(&raw, &guide)?;
        debug!(dataspec = %spec.describe(), "Inferred data specification");

        let sample = |dataset: Dataset| -> Result<Dataset, MlError> {
            if self.harness.dataset_sampling >= 1.0 {
                return Ok(dataset);
            }
            dataset.extract_rows(&sample_indices(dataset.nrow(), self.harness.dataset_sampling))
        };
        let full = sample(spec.parse_raw(&raw)?)?;

        let (mut train, valid, test) = match &self.test_dataset_filename {
            Some(filename) => {
                let test = sample(read_dataset(&self.resolve_path(filename)?, &spec)?)?;
                if self.harness.pass_validation_dataset {
                    // Alternate rows of the test file between test and validation.
                    let split = split_indices(test.nrow(), 0.5, false, None)?;
                    (
                        full,
                        Some(test.extract_rows(&split.test)?),
                        test.extract_rows(&split.train)?,
                    )
                } else {
                    (full, None, test)
                }
            }
            None => {
                let noise_seed = self
                    .harness
                    .inject_random_noise
                    .then_some(self.harness.noise_seed);
                let split = split_indices(
                    full.nrow(),
                    self.harness.split_train_ratio,
                    self.harness.pass_validation_dataset,
                    noise_seed,
                )?;
                let valid = if self.harness.pass_validation_dataset {
                    Some(full.extract_rows(&split.valid)?)
                } else {
                    None
                };
                (
                    full.extract_rows(&split.train)?,
                    valid,
                    full.extract_rows(&split.test)?,
                )
            }
        };

        if let Some(weight) = weight_column {
            let column = spec.require_column(weight)?;
            if column.column_type != ColumnType::Numerical {
                return Err(MlError::config(format!(
                    "weight column \"{weight}\" is {}, expected NUMERICAL",
                    column.column_type
                )));
            }
            self.evaluation_options.weight_column = Some(weight.to_string());
            if emulate_weights {
                // The learner sees duplicated rows instead of weights; the
                // weight column must not turn into an input feature.
                if self.train_config.features.is_empty() {
                    self.train_config.weight = Some(weight.to_string());
                    self.train_config.features = self.train_config.input_features(&spec);
                }
                self.train_config.weight = None;
                train = emulate_weights_by_duplication(&train, weight)?;
            } else {
                self.train_config.weight = Some(weight.to_string());
            }
        }

        info!(
            train = train.nrow(),
            valid = valid.as_ref().map_or(0, Dataset::nrow),
            test = test.nrow(),
            "Prepared datasets"
        );
        self.data = Some(PreparedData {
            spec,
            train,
            valid,
            test,
        });
        Ok(())
    }

    /// Train the model on the prepared datasets.
    ///
    /// `hook` runs right before the learner starts.
    pub fn train_model(&mut self, hook: Option<PreStartHook<'_>>) -> Result<(), MlError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| MlError::config("prepare_dataset must run before train_model"))?;
        let mut config = self.train_config.clone();
        if let Some(loss) = &self.harness.custom_loss {
            config.loss = Some(loss.clone());
        }

        let (train, valid) = if self.harness.pass_training_dataset_as_path {
            let format = self.preferred_format()?;
            let dir = self.test_dir.path();
            let shards = self.harness.num_shards;
            let train = DatasetInput::Path(shard_dataset(&data.train, shards, 1.0, format, "train", dir)?);
            let valid = match &data.valid {
                Some(valid) => Some(DatasetInput::Path(shard_dataset(
                    valid, shards, 1.0, format, "valid", dir,
                )?)),
                None => None,
            };
            (train, valid)
        } else {
            (
                DatasetInput::InMemory(&data.train),
                data.valid.as_ref().map(DatasetInput::InMemory),
            )
        };

        let mut run = TrainingRun::new(config, &data.spec, train);
        run.valid = valid;
        run.interrupt_after = self
            .harness
            .interrupt_training_after_secs
            .map(Duration::from_secs_f64);
        run.change_random_seed = self.harness.change_random_seed;
        run.pre_start_hook = hook;

        let trained = self.orchestrator.train(run)?;
        info!(
            kind = trained.model.kind(),
            duration_secs = trained.training_duration.as_secs_f64(),
            seed = trained.seed,
            interrupted = trained.interrupted,
            "Model trained"
        );
        self.training_duration = Some(trained.training_duration);
        self.model = Some(trained.model);
        self.evaluation = None;
        Ok(())
    }

    fn trained(&self) -> Result<(&dyn Model, &PreparedData), MlError> {
        match (self.model.as_deref(), self.data.as_ref()) {
            (Some(model), Some(data)) => Ok((model, data)),
            _ => Err(MlError::config("no trained model; call train_model first")),
        }
    }

    /// Evaluate the trained model on the test dataset.
    pub fn evaluate_model(&mut self) -> Result<&EvaluationResult, MlError> {
        let (model, data) = self.trained()?;
        let mut options = self.evaluation_options.clone();
        if self.evaluation_override.is_some() {
            options.task_override = self.evaluation_override;
        }
        if options.ranking_group.is_none() {
            options.ranking_group = self.train_config.ranking_group.clone();
        }
        let evaluation = StandardEvaluator.evaluate(model, &data.test, &options)?;
        Ok(self.evaluation.insert(evaluation))
    }

    fn golden_model_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(&self.train_config.learner)
    }

    /// Check the trained model: serialization round trip (when enabled), engine
    /// equivalence and golden model.
    ///
    /// Every check runs; their failures are returned together. On success the
    /// report only lists the skipped engines.
    pub fn post_training_checks(&self) -> Result<VerificationReport, MlError> {
        let (model, data) = self.trained()?;
        let description = model.describe(self.harness.show_full_model_structure);
        info!("Model:\n{description}");

        let mut report = VerificationReport::new();
        if self.harness.test_model_serialization {
            report.merge(check_serialization_roundtrip(
                model,
                &self.loaders,
                &data.test,
                self.test_dir.path(),
                self.harness.equivalence.batch_size,
            )?);
        }
        report.merge(check_engine_equivalence(model, &data.test, &self.harness.equivalence)?);
        report.merge(GoldenModelChecker::new(self.harness.golden.clone()).check(
            model,
            self.golden_model_name(),
            &self.loaders,
        )?);

        if report.is_ok() {
            info!(
                skipped_engines = report.skipped_engines.len(),
                "Post-training checks passed"
            );
            Ok(report)
        } else {
            Err(MlError::Verification(report))
        }
    }

    /// Run the whole pipeline and return the evaluation.
    ///
    /// With `emulate_weights`, the learner trains unweighted on rows duplicated
    /// by `weight_column` while the evaluation stays weighted.
    pub fn train_and_evaluate_model(
        &mut self,
        weight_column: Option<&str>,
        emulate_weights: bool,
        hook: Option<PreStartHook<'_>>,
    ) -> Result<&EvaluationResult, MlError> {
        if emulate_weights && weight_column.is_none() {
            return Err(MlError::config("weight emulation requires a weight column"));
        }
        self.prepare(weight_column, emulate_weights)?;
        self.train_model(hook)?;
        self.evaluate_model()?;
        if self.harness.check_model {
            self.post_training_checks()?;
        }
        self.evaluation
            .as_ref()
            .ok_or_else(|| MlError::inference("evaluation missing after the pipeline"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LINEAR_LEARNER_NAME;
    use pretty_assertions::assert_eq;

    fn synthetic_tester(num_examples: usize) -> TrainAndTestTester {
        let config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, LABEL_COLUMN);
        let mut tester = TrainAndTestTester::new(HarnessConfig::default(), config).unwrap();
        tester.synthetic.num_examples = num_examples;
        tester.configure_for_synthetic_dataset();
        tester
    }

    #[test]
    fn test_prepare_dataset_splits_synthetic_data() {
        let mut tester = synthetic_tester(101);
        tester.prepare_dataset(None).unwrap();
        assert_eq!(tester.train_dataset().unwrap().nrow(), 51);
        assert_eq!(tester.test_dataset().unwrap().nrow(), 50);
        assert!(tester.valid_dataset().is_none());
        assert!(tester.dataspec().unwrap().column(LABEL_COLUMN).is_some());
        assert_eq!(tester.effective_dataset_root(), tester.test_dir().to_path_buf());
        assert!(tester.test_dir().join("synthetic.tfr").exists());
    }

    #[test]
    fn test_configure_for_synthetic_ranking() {
        let config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, "y");
        let mut tester = TrainAndTestTester::new(HarnessConfig::default(), config).unwrap();
        tester.dataset_filename = Some("csv:data.csv".to_string());
        tester.synthetic.task = SyntheticTask::Ranking { group_size: 4 };
        tester.synthetic.num_text = 1;
        tester.configure_for_synthetic_dataset();
        assert_eq!(tester.train_config.task, Task::Ranking);
        assert_eq!(tester.train_config.label, LABEL_COLUMN);
        assert_eq!(tester.train_config.ranking_group.as_deref(), Some(GROUP_COLUMN));
        assert!(tester.dataset_filename.is_none());
        assert_eq!(tester.guide.column_guides.len(), 1);
    }

    #[test]
    fn test_dataset_root_for_files() {
        let config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, "y");
        let mut tester = TrainAndTestTester::new(HarnessConfig::default(), config).unwrap();
        tester.dataset_filename = Some("csv:data.csv".to_string());
        assert_eq!(
            tester.effective_dataset_root(),
            PathBuf::from("test_data/dataset")
        );
        let path = tester.resolve_path("csv:data.csv").unwrap();
        assert_eq!(path.path, PathBuf::from("test_data/dataset/data.csv"));
    }

    #[test]
    fn test_train_requires_prepared_data() {
        let mut tester = synthetic_tester(20);
        assert!(tester.train_model(None).unwrap_err().is_config());
        assert!(tester.post_training_checks().unwrap_err().is_config());
    }

    #[test]
    fn test_emulation_requires_weight_column() {
        let mut tester = synthetic_tester(20);
        assert!(tester
            .train_and_evaluate_model(None, true, None)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_weight_column_must_be_numerical() {
        let mut tester = synthetic_tester(20);
        let err = tester.prepare_dataset(Some("cat_0")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_full_pipeline_on_synthetic_classification() {
        let mut tester = synthetic_tester(300);
        tester
            .train_config
            .hyperparameters
            .insert("num_epochs".into(), crate::training::config::HyperParameterValue::Integer(5));
        let accuracy = tester
            .train_and_evaluate_model(None, false, None)
            .unwrap()
            .accuracy
            .unwrap();
        assert!(accuracy > 0.6, "accuracy {accuracy}");
        assert!(tester.model().is_some());
        assert!(tester.training_duration().is_some());
    }
}
