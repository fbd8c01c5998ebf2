//! Verify or record metric assertions.

use crate::config::MetricCheckConfig;
use crate::data::csv::format_record;
use crate::error::{MlError, io_at};
use crate::metric::assertion::MetricAssertion;
use crate::verify::report::{VerificationFailure, VerificationReport};
use std::path::PathBuf;
use tracing::{debug, error};

/// Header of metric dump files.
pub const DUMP_HEADER: &str =
    "test_name,metric_name,value,center,margin,gold,source_file,source_line";

/// What happened to a checked assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricOutcome {
    Passed,
    /// Dump mode: the assertion was appended to this file and not checked.
    Recorded(PathBuf),
}

/// Checks metric assertions, or records them when a dump directory is set.
#[derive(Debug, Clone, Default)]
pub struct MetricChecker {
    config: MetricCheckConfig,
}

impl MetricChecker {
    pub fn new(config: MetricCheckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricCheckConfig {
        &self.config
    }

    pub fn is_dump_mode(&self) -> bool {
        self.config.dump_dir.is_some()
    }

    /// Dump file of a test, in dump mode.
    pub fn dump_path(&self, test_name: &str) -> Option<PathBuf> {
        self.config
            .dump_dir
            .as_ref()
            .map(|dir| dir.join(format!("{test_name}.csv")))
    }

    /// Check `assertion`.
    ///
    /// In dump mode the assertion is appended to the test's dump file and never
    /// fails. Otherwise the margin check and, when enabled, the gold check
    /// must pass.
    pub fn check(&self, assertion: &MetricAssertion) -> Result<MetricOutcome, MlError> {
        if let Some(path) = self.dump_path(&assertion.test_name) {
            let line = format_record(&assertion.record_fields())?;
            modelcheck_core::persistence::append_line(&path, Some(DUMP_HEADER), &line)
                .map_err(|e| io_at(&path, e))?;
            debug!(
                metric = %assertion.metric_name,
                value = assertion.value,
                path = %path.display(),
                "Recorded metric"
            );
            return Ok(MetricOutcome::Recorded(path));
        }

        let mut report = VerificationReport::new();
        if !assertion.within_margin() {
            report.push(VerificationFailure::MetricOutOfMargin {
                test: assertion.test_name.clone(),
                metric: assertion.metric_name.clone(),
                value: assertion.value,
                center: assertion.center,
                margin: assertion.margin,
                file: assertion.source_file.clone(),
                line: assertion.source_line,
            });
        }
        if self.config.check_gold && !assertion.matches_gold() {
            if let Some(gold) = assertion.finite_gold() {
                report.push(VerificationFailure::MetricGoldMismatch {
                    test: assertion.test_name.clone(),
                    metric: assertion.metric_name.clone(),
                    value: assertion.value,
                    gold,
                    file: assertion.source_file.clone(),
                    line: assertion.source_line,
                });
            }
        }
        report.into_result()?;
        Ok(MetricOutcome::Passed)
    }

    /// Check a metric located at the caller; panics on failure.
    #[track_caller]
    pub fn assert_metric(
        &self,
        test_name: &str,
        metric_name: &str,
        value: f64,
        center: f64,
        margin: f64,
        gold: Option<f64>,
    ) {
        let assertion = MetricAssertion::new(test_name, metric_name, value, center, margin, gold);
        if let Err(e) = self.check(&assertion) {
            panic!("{e}");
        }
    }

    /// Check a metric located at the caller; logs and returns `false` on failure.
    #[track_caller]
    pub fn expect_metric(
        &self,
        test_name: &str,
        metric_name: &str,
        value: f64,
        center: f64,
        margin: f64,
        gold: Option<f64>,
    ) -> bool {
        let assertion = MetricAssertion::new(test_name, metric_name, value, center, margin, gold);
        match self.check(&assertion) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Metric expectation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_margin_fails_with_location() {
        let checker = MetricChecker::default();
        let a = MetricAssertion::new("adult", "accuracy", 0.70, 0.86, 0.01, None);
        let err = checker.check(&a).unwrap_err();
        let report = err.verification_report().unwrap();
        assert!(matches!(
            &report.failures[..],
            [VerificationFailure::MetricOutOfMargin { line, .. }] if *line == a.source_line
        ));
    }

    #[test]
    fn test_gold_checked_only_when_enabled() {
        let a = MetricAssertion::new("adult", "accuracy", 0.86, 0.86, 0.01, Some(0.87));
        assert_eq!(MetricChecker::default().check(&a).unwrap(), MetricOutcome::Passed);
        let strict = MetricChecker::new(MetricCheckConfig {
            dump_dir: None,
            check_gold: true,
        });
        assert!(strict.check(&a).is_err());
    }

    #[test]
    fn test_dump_mode_never_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let checker = MetricChecker::new(MetricCheckConfig {
            dump_dir: Some(dir.path().to_path_buf()),
            check_gold: true,
        });
        let a = MetricAssertion::new("adult", "accuracy", 0.10, 0.86, 0.01, Some(0.5));
        let outcome = checker.check(&a).unwrap();
        assert_eq!(outcome, MetricOutcome::Recorded(dir.path().join("adult.csv")));
        checker.check(&a).unwrap();
        let content = std::fs::read_to_string(dir.path().join("adult.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], DUMP_HEADER);
        assert!(lines[1].starts_with("adult,accuracy,0.1,0.86,0.01,0.5,"));
    }

    #[test]
    #[should_panic(expected = "outside 0.86 +/- 0.01")]
    fn test_assert_metric_panics() {
        MetricChecker::default().assert_metric("adult", "accuracy", 0.5, 0.86, 0.01, None);
    }

    #[test]
    fn test_expect_metric_reports() {
        let checker = MetricChecker::default();
        assert!(checker.expect_metric("adult", "accuracy", 0.86, 0.86, 0.01, None));
        assert!(!checker.expect_metric("adult", "accuracy", 0.5, 0.86, 0.01, None));
    }
}
