//! Golden models and serialization round trips through the pipeline.

use modelcheck_core::init_test_logging;
use modelcheck_ml::config::{GoldenConfig, HarnessConfig};
use modelcheck_ml::data::synthetic::LABEL_COLUMN;
use modelcheck_ml::linear::LINEAR_LEARNER_NAME;
use modelcheck_ml::model::{ModelLoaderRegistry, SerializationForm};
use modelcheck_ml::training::HyperParameterValue;
use modelcheck_ml::verify::{reload_model, semantic_digest, write_golden_model};
use modelcheck_ml::{Task, TrainAndTestTester, TrainingConfig, VerificationFailure};
use std::path::Path;
use tempfile::TempDir;

fn tester(golden_root: &Path, enabled: bool, seed: u64) -> TrainAndTestTester {
    init_test_logging();
    let harness = HarnessConfig {
        golden: GoldenConfig {
            enabled,
            root: golden_root.to_path_buf(),
        },
        ..Default::default()
    };
    let mut config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, LABEL_COLUMN)
        .with_hyperparameter("num_epochs", HyperParameterValue::Integer(3));
    config.random_seed = seed;
    let mut tester = TrainAndTestTester::new(harness, config).unwrap();
    tester.synthetic.num_examples = 200;
    tester.model_name = Some("synthetic_linear".to_string());
    tester.configure_for_synthetic_dataset();
    tester
}

#[test]
fn retrained_model_matches_its_golden_model() {
    let root = TempDir::new().unwrap();
    let mut first = tester(root.path(), false, 7);
    first.train_and_evaluate_model(None, false, None).unwrap();
    write_golden_model(first.model().unwrap(), root.path(), "synthetic_linear").unwrap();

    let mut second = tester(root.path(), true, 7);
    second.train_and_evaluate_model(None, false, None).unwrap();
    assert_eq!(
        semantic_digest(first.model().unwrap()).unwrap(),
        semantic_digest(second.model().unwrap()).unwrap()
    );
}

#[test]
fn different_seed_differs_from_golden_model() {
    let root = TempDir::new().unwrap();
    let mut first = tester(root.path(), false, 7);
    first.train_and_evaluate_model(None, false, None).unwrap();
    write_golden_model(first.model().unwrap(), root.path(), "synthetic_linear").unwrap();

    let mut second = tester(root.path(), true, 8);
    let err = second.train_and_evaluate_model(None, false, None).unwrap_err();
    let report = err.verification_report().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        VerificationFailure::GoldenModel { model_name, .. } if model_name == "synthetic_linear"
    ));
    // The evaluation ran before the checks.
    assert!(second.evaluation().is_some());
}

#[test]
fn missing_golden_directory_is_a_configuration_error() {
    let root = TempDir::new().unwrap();
    let mut tester = tester(root.path(), true, 7);
    let err = tester.train_and_evaluate_model(None, false, None).unwrap_err();
    assert!(err.is_config(), "{err}");
}

#[test]
fn reloaded_models_describe_the_same_model() {
    let root = TempDir::new().unwrap();
    let mut tester = tester(root.path(), false, 7);
    tester.train_and_evaluate_model(None, false, None).unwrap();
    let model = tester.model().unwrap();
    let loaders = ModelLoaderRegistry::with_defaults();
    let scratch = TempDir::new().unwrap();
    for form in SerializationForm::ALL {
        let reloaded = reload_model(model, form, &loaders, scratch.path()).unwrap();
        assert_eq!(reloaded.kind(), model.kind());
        assert_eq!(reloaded.describe(true), model.describe(true), "{form}");
        assert_eq!(
            semantic_digest(reloaded.as_ref()).unwrap(),
            semantic_digest(model).unwrap()
        );
    }
}
