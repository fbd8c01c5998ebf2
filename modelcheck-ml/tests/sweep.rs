//! Predefined hyperparameter sweeps of the linear learner.

use modelcheck_ml::data::format::write_dataset;
use modelcheck_ml::data::split::split_indices;
use modelcheck_ml::data::synthetic::{self, LABEL_COLUMN, SyntheticDatasetOptions};
use modelcheck_ml::data::{DatasetFormat, Dataset, TypedPath};
use modelcheck_ml::linear::LINEAR_LEARNER_NAME;
use modelcheck_ml::model::{ModelLoaderRegistry, SerializationForm};
use modelcheck_ml::training::{
    SweepData, SweepOptions, TrainingOrchestrator, TrialStatus, run_predefined_hyperparameters,
    run_predefined_hyperparameters_on_synthetic_ranking,
    run_predefined_hyperparameters_with_loaders,
};
use modelcheck_ml::{Task, TrainingConfig, VerificationFailure};
use tempfile::TempDir;

const NUM_PRESETS: usize = 3;

fn train_test() -> (Dataset, Dataset) {
    let data = synthetic::generate(&SyntheticDatasetOptions {
        num_examples: 300,
        ..Default::default()
    })
    .unwrap();
    let split = split_indices(data.nrow(), 0.5, false, None).unwrap();
    (
        data.extract_rows(&split.train).unwrap(),
        data.extract_rows(&split.test).unwrap(),
    )
}

fn options() -> SweepOptions {
    SweepOptions {
        check_serialization: true,
        ..Default::default()
    }
}

fn config() -> TrainingConfig {
    TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, LABEL_COLUMN)
}

#[test]
fn every_preset_runs_and_is_checked() {
    let (train, test) = train_test();
    let sweep = run_predefined_hyperparameters(
        &TrainingOrchestrator::default(),
        &config(),
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        NUM_PRESETS,
        Some(0.6),
        &options(),
    )
    .unwrap();

    assert_eq!(sweep.trials.len(), NUM_PRESETS);
    assert!(sweep.trials.iter().all(|t| t.status == TrialStatus::Succeeded));
    assert!(sweep.trials.iter().all(|t| t.metric.unwrap() >= 0.6));
    let presets: Vec<&str> = sweep.trials.iter().map(|t| t.preset.as_str()).collect();
    assert_eq!(presets, ["fast@v1", "regularized@v1", "long@v1"]);
    assert!(sweep.best_trial.is_some());
}

#[test]
fn preset_count_mismatch_is_a_failure() {
    let (train, test) = train_test();
    let err = run_predefined_hyperparameters(
        &TrainingOrchestrator::default(),
        &config(),
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        NUM_PRESETS + 1,
        None,
        &options(),
    )
    .unwrap_err();
    let report = err.verification_report().unwrap();
    assert_eq!(
        report.failures,
        vec![VerificationFailure::PresetCount {
            expected: NUM_PRESETS + 1,
            actual: NUM_PRESETS,
        }]
    );
}

#[test]
fn unreachable_accuracy_floor_fails_every_preset() {
    let (train, test) = train_test();
    let err = run_predefined_hyperparameters(
        &TrainingOrchestrator::default(),
        &config(),
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        NUM_PRESETS,
        Some(1.01),
        &SweepOptions::default(),
    )
    .unwrap_err();
    let failures = &err.verification_report().unwrap().failures;
    assert_eq!(failures.len(), NUM_PRESETS);
    assert!(
        failures
            .iter()
            .all(|f| matches!(f, VerificationFailure::PresetAccuracy { .. }))
    );
}

#[test]
fn sweep_over_dataset_files() {
    let (train, test) = train_test();
    let dir = TempDir::new().unwrap();
    let train_file = dir.path().join("train.csv");
    let test_file = dir.path().join("test.tfr");
    write_dataset(&train, DatasetFormat::Csv, &train_file).unwrap();
    write_dataset(&test, DatasetFormat::TfRecord, &test_file).unwrap();

    let sweep = run_predefined_hyperparameters(
        &TrainingOrchestrator::default(),
        &config(),
        SweepData::Paths {
            train: TypedPath::new(DatasetFormat::Csv, train_file),
            test: TypedPath::new(DatasetFormat::TfRecord, test_file),
        },
        NUM_PRESETS,
        None,
        &options(),
    )
    .unwrap();
    assert_eq!(sweep.trials.len(), NUM_PRESETS);
}

#[test]
fn unknown_learner_is_a_configuration_error() {
    let (train, test) = train_test();
    let config = TrainingConfig::new("NO_SUCH_LEARNER", Task::Classification, LABEL_COLUMN);
    let err = run_predefined_hyperparameters(
        &TrainingOrchestrator::default(),
        &config,
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        NUM_PRESETS,
        None,
        &options(),
    )
    .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn default_options_round_trip_every_preset() {
    assert!(SweepOptions::default().check_serialization);

    let (train, test) = train_test();
    // No loader knows the linear model kind, so every reload fails.
    let err = run_predefined_hyperparameters_with_loaders(
        &TrainingOrchestrator::default(),
        &ModelLoaderRegistry::new(),
        &config(),
        SweepData::InMemory {
            train: &train,
            test: &test,
        },
        NUM_PRESETS,
        None,
        &SweepOptions::default(),
    )
    .unwrap_err();
    let failures = &err.verification_report().unwrap().failures;
    assert_eq!(failures.len(), NUM_PRESETS * SerializationForm::ALL.len());
    assert!(
        failures
            .iter()
            .all(|f| matches!(f, VerificationFailure::Serialization { .. }))
    );
}

#[test]
fn presets_on_synthetic_ranking_data() {
    let base = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, "ignored");
    let sweep = run_predefined_hyperparameters_on_synthetic_ranking(
        &TrainingOrchestrator::default(),
        &base,
        NUM_PRESETS,
        &SweepOptions::default(),
    )
    .unwrap();
    assert_eq!(sweep.trials.len(), NUM_PRESETS);
    assert!(sweep.trials.iter().all(|t| t.status == TrialStatus::Succeeded));
    assert!(sweep.trials.iter().all(|t| t.metric.is_some_and(|ndcg| ndcg > 0.0)));
}
