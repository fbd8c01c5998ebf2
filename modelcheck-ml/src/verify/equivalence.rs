//! Prediction equivalence between the reference engine and specialized engines.

use crate::config::EquivalenceConfig;
use crate::data::dataset::Dataset;
use crate::error::MlError;
use crate::model::{BatchPredict, EngineAvailability, ExampleBatch, Model, Prediction, Task};
use crate::verify::report::{SkippedEngine, VerificationFailure, VerificationReport};
use tracing::{debug, info, warn};

/// Whether two predictions agree within `tolerance`.
fn agrees(expected: &Prediction, actual: &Prediction, tolerance: f32) -> bool {
    expected.bit_equal(actual) || matches!(expected.max_abs_diff(actual), Some(d) if d <= tolerance)
}

/// Compare `engine` with `reference` over `dataset`, batch by batch.
///
/// The dataset is cut into `ceil(n / batch_size)` batches. Every disagreeing
/// row yields one failure. An engine error or a wrong prediction count ends the
/// comparison for this engine with a single failure; errors of the reference
/// engine are returned as errors.
pub fn compare_engines(
    reference: &dyn BatchPredict,
    engine: &dyn BatchPredict,
    task: Task,
    dataset: &Dataset,
    config: &EquivalenceConfig,
) -> Result<VerificationReport, MlError> {
    config.validate()?;
    let mut report = VerificationReport::new();
    let num_batches = dataset.nrow().div_ceil(config.batch_size);
    debug!(
        engine = engine.name(),
        %task,
        rows = dataset.nrow(),
        num_batches,
        "Comparing engine with reference"
    );

    for batch_index in 0..num_batches {
        let begin = batch_index * config.batch_size;
        let batch = ExampleBatch::new(dataset, begin, begin + config.batch_size);
        let expected = reference.predict_batch(&batch)?;
        let actual = match engine.predict_batch(&batch) {
            Ok(actual) => actual,
            Err(e) => {
                warn!(engine = engine.name(), batch = batch_index, error = %e, "Engine failed");
                report.push(VerificationFailure::EngineError {
                    engine: engine.name().to_string(),
                    message: format!("batch {batch_index}: {e}"),
                });
                return Ok(report);
            }
        };
        if actual.len() != batch.len() {
            report.push(VerificationFailure::BatchSizeMismatch {
                engine: engine.name().to_string(),
                batch: batch_index,
                expected: batch.len(),
                actual: actual.len(),
            });
            return Ok(report);
        }
        for ((row, expected), actual) in batch.rows().zip(expected).zip(actual) {
            if !agrees(&expected, &actual, config.tolerance) {
                report.push(VerificationFailure::PredictionMismatch {
                    engine: engine.name().to_string(),
                    batch: batch_index,
                    row,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(report)
}

/// Check every specialized engine of `model` against its reference engine.
///
/// Engines the model reports as unsupported are recorded as skipped.
pub fn check_engine_equivalence(
    model: &dyn Model,
    dataset: &Dataset,
    config: &EquivalenceConfig,
) -> Result<VerificationReport, MlError> {
    let reference = model.reference_engine();
    let mut report = VerificationReport::new();
    let mut checked = 0usize;
    for availability in model.specialized_engines() {
        match availability {
            EngineAvailability::Available(engine) => {
                let engine_report = compare_engines(
                    reference.as_ref(),
                    engine.as_ref(),
                    model.task(),
                    dataset,
                    config,
                )?;
                info!(
                    engine = engine.name(),
                    failures = engine_report.failures.len(),
                    "Engine checked against reference"
                );
                report.merge(engine_report);
                checked += 1;
            }
            EngineAvailability::Unsupported { name, reason } => {
                info!(engine = %name, %reason, "Engine not available for this model");
                report.skipped_engines.push(SkippedEngine { name, reason });
            }
        }
    }
    info!(
        checked,
        skipped = report.skipped_engines.len(),
        failures = report.failures.len(),
        "Engine equivalence done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::toy_dataset;

    struct ConstantEngine {
        name: &'static str,
        value: f32,
        drop_last: bool,
    }

    impl BatchPredict for ConstantEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn predict_batch(&self, batch: &ExampleBatch<'_>) -> Result<Vec<Prediction>, MlError> {
            let n = if self.drop_last { batch.len() - 1 } else { batch.len() };
            Ok(vec![Prediction::Regression { value: self.value }; n])
        }
    }

    fn engine(name: &'static str, value: f32) -> ConstantEngine {
        ConstantEngine {
            name,
            value,
            drop_last: false,
        }
    }

    #[test]
    fn test_within_tolerance_passes() {
        let dataset = toy_dataset();
        let config = EquivalenceConfig {
            batch_size: 3,
            tolerance: 1e-3,
        };
        let report = compare_engines(
            &engine("ref", 1.0),
            &engine("near", 1.0005),
            Task::Regression,
            &dataset,
            &config,
        )
        .unwrap();
        assert!(report.is_ok());
    }

    #[test]
    fn test_every_row_reported() {
        let dataset = toy_dataset();
        let config = EquivalenceConfig {
            batch_size: 3,
            tolerance: 1e-5,
        };
        let report = compare_engines(
            &engine("ref", 1.0),
            &engine("far", 2.0),
            Task::Regression,
            &dataset,
            &config,
        )
        .unwrap();
        let rows: Vec<(usize, usize)> = report
            .failures
            .iter()
            .map(|f| match f {
                VerificationFailure::PredictionMismatch { batch, row, .. } => (*batch, *row),
                other => panic!("unexpected failure {other}"),
            })
            .collect();
        assert_eq!(rows, vec![(0, 0), (0, 1), (0, 2), (1, 3)]);
    }

    #[test]
    fn test_short_batch_is_one_failure() {
        let dataset = toy_dataset();
        let short = ConstantEngine {
            name: "short",
            value: 1.0,
            drop_last: true,
        };
        let report = compare_engines(
            &engine("ref", 1.0),
            &short,
            Task::Regression,
            &dataset,
            &EquivalenceConfig::default(),
        )
        .unwrap();
        assert_eq!(
            report.failures,
            vec![VerificationFailure::BatchSizeMismatch {
                engine: "short".into(),
                batch: 0,
                expected: 4,
                actual: 3,
            }]
        );
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        let dataset = toy_dataset();
        let config = EquivalenceConfig {
            batch_size: 0,
            tolerance: 1e-5,
        };
        let err = compare_engines(
            &engine("ref", 1.0),
            &engine("same", 1.0),
            Task::Regression,
            &dataset,
            &config,
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_nan_never_agrees_with_number() {
        let a = Prediction::Regression { value: f32::NAN };
        let b = Prediction::Regression { value: 0.0 };
        assert!(!agrees(&a, &b, 1.0));
        assert!(agrees(&a, &a.clone(), 0.0));
    }
}
