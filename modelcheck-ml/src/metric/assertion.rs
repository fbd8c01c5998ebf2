//! A metric value with its expected range and source location.

use std::panic::Location;
use std::path::PathBuf;

/// Expectation on one evaluation metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAssertion {
    pub test_name: String,
    pub metric_name: String,
    pub value: f64,
    pub center: f64,
    pub margin: f64,
    /// Exact value recorded for this build, checked only when gold checks are on.
    pub gold: Option<f64>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

/// Relative tolerance of the gold check.
pub const GOLD_EPSILON: f64 = 1e-6;

impl MetricAssertion {
    /// Build an assertion located at the caller.
    ///
    /// `test_name` is reduced to its last `::` segment.
    #[track_caller]
    pub fn new(
        test_name: &str,
        metric_name: impl Into<String>,
        value: f64,
        center: f64,
        margin: f64,
        gold: Option<f64>,
    ) -> Self {
        let location = Location::caller();
        Self {
            test_name: simple_test_name(test_name).to_string(),
            metric_name: metric_name.into(),
            value,
            center,
            margin,
            gold,
            source_file: PathBuf::from(location.file()),
            source_line: location.line(),
        }
    }

    /// `|value - center| <= margin`; a NaN value is never within margin.
    pub fn within_margin(&self) -> bool {
        (self.value - self.center).abs() <= self.margin
    }

    /// The gold value to check against, if any.
    pub fn finite_gold(&self) -> Option<f64> {
        self.gold.filter(|g| g.is_finite())
    }

    /// `|value - gold| <= GOLD_EPSILON * max(1, |gold|)`, or true without a finite gold.
    pub fn matches_gold(&self) -> bool {
        match self.finite_gold() {
            Some(gold) => (self.value - gold).abs() <= GOLD_EPSILON * gold.abs().max(1.0),
            None => true,
        }
    }

    /// Fields of the dump record, in header order.
    pub(crate) fn record_fields(&self) -> [String; 8] {
        [
            self.test_name.clone(),
            self.metric_name.clone(),
            self.value.to_string(),
            self.center.to_string(),
            self.margin.to_string(),
            self.gold.map(|g| g.to_string()).unwrap_or_default(),
            self.source_file.display().to_string(),
            self.source_line.to_string(),
        ]
    }
}

/// Last `::` segment of a test path.
pub fn simple_test_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Name of the running test, taken from the test thread name.
pub fn current_test_name() -> String {
    std::thread::current()
        .name()
        .map(|name| simple_test_name(name).to_string())
        .unwrap_or_else(|| "unnamed_test".to_string())
}
