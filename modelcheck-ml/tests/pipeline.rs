//! End-to-end tests of the train-and-test pipeline with the linear learner.
//!
//! Expected metric ranges are deliberately loose: they hold for the default
//! synthetic datasets and catch a broken learner or evaluator, not small drifts.

use modelcheck_core::init_test_logging;
use modelcheck_ml::config::{HarnessConfig, MetricCheckConfig};
use modelcheck_ml::data::synthetic::{LABEL_COLUMN, SyntheticTask};
use modelcheck_ml::importance::variable_importance_rank;
use modelcheck_ml::linear::LINEAR_LEARNER_NAME;
use modelcheck_ml::metric::MetricChecker;
use modelcheck_ml::training::HyperParameterValue;
use modelcheck_ml::uplift::{UPLIFT_CSV_HEADER, export_uplift_predictions_csv};
use modelcheck_ml::{MlError, Task, TrainAndTestTester, TrainingConfig};
use std::cell::Cell;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Tester on the synthetic generator, with a fixed epoch count.
fn synthetic_tester(task: SyntheticTask, num_examples: usize) -> TrainAndTestTester {
    init_test_logging();
    let config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, LABEL_COLUMN)
        .with_hyperparameter("num_epochs", HyperParameterValue::Integer(10));
    let mut tester = TrainAndTestTester::new(HarnessConfig::default(), config).unwrap();
    tester.synthetic.task = task;
    tester.synthetic.num_examples = num_examples;
    tester.configure_for_synthetic_dataset();
    tester
}

fn checker() -> MetricChecker {
    MetricChecker::new(MetricCheckConfig::default())
}

/// Write a CSV with a weight column: `x` in 0..10, `LABEL` is `pos` when `x >= 5`.
fn write_weighted_csv(dir: &Path, name: &str, rows: usize) {
    let mut content = String::from("x,w,LABEL\n");
    for i in 0..rows {
        let x = i % 10;
        let w = 1 + i % 3;
        let label = if x >= 5 { "pos" } else { "neg" };
        content.push_str(&format!("{x},{w},{label}\n"));
    }
    std::fs::write(dir.join(name), content).unwrap();
}

fn file_tester(root: &Path) -> TrainAndTestTester {
    init_test_logging();
    let harness = HarnessConfig {
        dataset_root_directory: root.to_path_buf(),
        ..Default::default()
    };
    let config = TrainingConfig::new(LINEAR_LEARNER_NAME, Task::Classification, LABEL_COLUMN);
    let mut tester = TrainAndTestTester::new(harness, config).unwrap();
    tester.dataset_filename = Some("csv:weighted.csv".to_string());
    tester
}

#[test]
fn classification_pipeline_meets_expected_accuracy() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 600);
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap().clone();

    assert_eq!(evaluation.task, Task::Classification);
    assert_eq!(evaluation.num_examples, 300);
    checker().assert_metric(
        "classification_pipeline_meets_expected_accuracy",
        "accuracy",
        evaluation.accuracy.unwrap(),
        0.8,
        0.2,
        None,
    );
    assert!(evaluation.log_loss.unwrap() < 0.69);

    let report = tester.post_training_checks().unwrap();
    assert!(report.is_ok());
    assert!(report.skipped_engines.is_empty());
}

#[test]
fn multiclass_pipeline() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 3 }, 600);
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    // Better than always predicting one of three classes.
    assert!(evaluation.accuracy.unwrap() > 0.45);
    assert_eq!(tester.model().unwrap().label_classes().len(), 3);
}

#[test]
fn regression_pipeline() {
    let mut tester = synthetic_tester(SyntheticTask::Regression, 400);
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    let rmse = evaluation.rmse.unwrap();
    // Labels have a standard deviation well above 5.
    assert!(rmse.is_finite() && rmse < 8.0, "rmse={rmse}");
    assert!(evaluation.accuracy.is_none());
}

#[test]
fn ranking_pipeline() {
    let mut tester = synthetic_tester(SyntheticTask::Ranking { group_size: 10 }, 400);
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    let ndcg = evaluation.ndcg.unwrap();
    assert!((0.0..=1.0).contains(&ndcg));
    assert!(ndcg > 0.6, "ndcg={ndcg}");
}

#[test]
fn uplift_pipeline_skips_flat_engines() {
    let mut tester = synthetic_tester(SyntheticTask::Uplift, 600);
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    let uplift = evaluation.mean_uplift.unwrap();
    assert!(uplift > 0.3 && uplift < 1.7, "mean_uplift={uplift}");

    let report = tester.post_training_checks().unwrap();
    assert_eq!(report.skipped_engines.len(), 2);
}

#[test]
fn training_from_sharded_paths_with_validation() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 300);
    tester.harness.pass_training_dataset_as_path = true;
    tester.harness.pass_validation_dataset = true;
    tester.harness.num_shards = 4;
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    assert_eq!(evaluation.num_examples, 75);

    assert_eq!(tester.train_dataset().unwrap().nrow(), 150);
    assert_eq!(tester.valid_dataset().unwrap().nrow(), 75);
    let shards: Vec<_> = std::fs::read_dir(tester.test_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("train-"))
        .collect();
    assert_eq!(shards.len(), 4);
}

#[test]
fn noise_injection_keeps_fold_sizes() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 200);
    tester.harness.inject_random_noise = true;
    tester.harness.change_random_seed = true;
    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    assert_eq!(evaluation.num_examples, 100);
    assert!(evaluation.accuracy.unwrap() > 0.55);
}

#[test]
fn deadline_interrupts_training_after_hook() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 400);
    tester.train_config.hyperparameters.insert(
        "num_epochs".to_string(),
        HyperParameterValue::Integer(100_000),
    );
    tester.harness.interrupt_training_after_secs = Some(0.0);

    let hook_calls = Cell::new(0);
    let hook = || {
        hook_calls.set(hook_calls.get() + 1);
        // Leave the watchdog time to raise the stop signal.
        std::thread::sleep(Duration::from_millis(50));
    };
    let evaluation = tester
        .train_and_evaluate_model(None, false, Some(Box::new(hook)))
        .unwrap();
    assert!(evaluation.accuracy.is_some());
    assert_eq!(hook_calls.get(), 1);

    let description = tester.model().unwrap().describe(false);
    assert!(description.contains("interrupted"), "{description}");
    assert!(tester.training_duration().unwrap() < Duration::from_secs(30));
}

#[test]
fn configuration_error_aborts_before_hook() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 50);
    tester.train_config.label = "NOT_A_COLUMN".to_string();
    let hook_called = Cell::new(false);
    let err = tester
        .train_and_evaluate_model(None, false, Some(Box::new(|| hook_called.set(true))))
        .unwrap_err();
    assert!(err.is_config(), "{err}");
    assert!(!hook_called.get());
    assert!(tester.model().is_none());
    assert!(tester.evaluation().is_none());
}

#[test]
fn custom_loss_is_forwarded() {
    let mut tester = synthetic_tester(SyntheticTask::Regression, 200);
    tester.harness.custom_loss = Some("huber".to_string());
    assert!(tester.train_and_evaluate_model(None, false, None).is_ok());

    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 200);
    tester.harness.custom_loss = Some("huber".to_string());
    let err = tester.train_and_evaluate_model(None, false, None).unwrap_err();
    assert!(matches!(err, MlError::Config(_)));
}

#[test]
fn weighted_training_from_csv() {
    let dir = TempDir::new().unwrap();
    write_weighted_csv(dir.path(), "weighted.csv", 200);
    let mut tester = file_tester(dir.path());

    let evaluation = tester.train_and_evaluate_model(Some("w"), false, None).unwrap().clone();
    assert_eq!(evaluation.num_examples, 100);
    assert!(evaluation.sum_weights > 100.0);
    assert_eq!(tester.train_config.weight.as_deref(), Some("w"));
    assert!(evaluation.accuracy.unwrap() > 0.8);
}

#[test]
fn weight_emulation_duplicates_training_rows() {
    let dir = TempDir::new().unwrap();
    write_weighted_csv(dir.path(), "weighted.csv", 200);
    let mut tester = file_tester(dir.path());

    let evaluation = tester.train_and_evaluate_model(Some("w"), true, None).unwrap();
    assert!(evaluation.sum_weights > 100.0);
    assert!(tester.train_config.weight.is_none());
    assert_eq!(tester.train_config.features, vec!["x".to_string()]);
    // Heaviest rows (w = 3) get 10 copies, the others 3 or 6.
    assert!(tester.train_dataset().unwrap().nrow() > 500);
}

#[test]
fn separate_test_file() {
    let dir = TempDir::new().unwrap();
    write_weighted_csv(dir.path(), "weighted.csv", 120);
    write_weighted_csv(dir.path(), "holdout.csv", 40);
    let mut tester = file_tester(dir.path());
    tester.test_dataset_filename = Some("csv:holdout.csv".to_string());

    let evaluation = tester.train_and_evaluate_model(None, false, None).unwrap();
    assert_eq!(evaluation.num_examples, 40);
    assert_eq!(tester.train_dataset().unwrap().nrow(), 120);
}

#[test]
fn missing_dataset_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut tester = file_tester(dir.path());
    assert!(tester.prepare_dataset(None).is_err());
    assert!(tester.dataspec().is_none());
}

#[test]
fn dataset_sampling_reduces_rows() {
    let mut tester = synthetic_tester(SyntheticTask::Classification { num_classes: 2 }, 200);
    tester.harness.dataset_sampling = 0.5;
    tester.prepare_dataset(None).unwrap();
    assert_eq!(
        tester.train_dataset().unwrap().nrow() + tester.test_dataset().unwrap().nrow(),
        100
    );
}

#[test]
fn skipping_model_checks() {
    let mut tester = synthetic_tester(SyntheticTask::Regression, 100);
    tester.harness.check_model = false;
    tester.harness.test_model_serialization = false;
    assert!(tester.train_and_evaluate_model(None, false, None).is_ok());
    // Checks can still be run explicitly.
    assert!(tester.post_training_checks().is_ok());
}

#[test]
fn uplift_predictions_export() {
    let mut tester = synthetic_tester(SyntheticTask::Uplift, 200);
    tester.train_and_evaluate_model(None, false, None).unwrap();
    let out = TempDir::new().unwrap();
    let file = out.path().join("uplift.csv");
    let written = export_uplift_predictions_csv(
        tester.model().unwrap(),
        tester.test_dataset().unwrap(),
        None,
        &file,
    )
    .unwrap();
    assert_eq!(written, 100);

    let content = std::fs::read_to_string(&file).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next().unwrap(), UPLIFT_CSV_HEADER.join(","));
    let groups: Vec<&str> = lines.map(|l| l.rsplit(',').next().unwrap()).collect();
    assert_eq!(groups.len(), 100);
    assert!(groups.iter().all(|g| *g == "0" || *g == "1"));
}

#[test]
fn informative_feature_ranks_first() {
    let dir = TempDir::new().unwrap();
    let mut content = String::from("signal,noise,LABEL\n");
    for i in 0..300 {
        let signal = i % 10;
        let noise = (i * 7919) % 13;
        let label = if signal >= 5 { "pos" } else { "neg" };
        content.push_str(&format!("{signal},{noise},{label}\n"));
    }
    std::fs::write(dir.path().join("signal.csv"), content).unwrap();

    let mut tester = file_tester(dir.path());
    tester.dataset_filename = Some("csv:signal.csv".to_string());
    tester.train_and_evaluate_model(None, false, None).unwrap();

    let importances = tester.model().unwrap().variable_importances();
    let ranking = importances.values().next().unwrap();
    let spec = tester.dataspec().unwrap();
    assert_eq!(variable_importance_rank("signal", spec, ranking).unwrap(), 0);
    assert_eq!(variable_importance_rank("noise", spec, ranking).unwrap(), 1);
    assert!(variable_importance_rank("LABEL", spec, ranking).is_err());
    assert!(variable_importance_rank("unknown", spec, ranking).unwrap_err().is_config());
}
