//! Metric assertions with a verify mode and a record ("dump") mode.
//!
//! In verify mode every assertion must fall within `center +/- margin`, and
//! optionally equal its gold value. In dump mode assertions are appended to
//! `<dump_dir>/<test_name>.csv` so expected ranges can be recalibrated offline.

pub mod assertion;
pub mod checker;

pub use assertion::{MetricAssertion, current_test_name, simple_test_name};
pub use checker::{DUMP_HEADER, MetricChecker, MetricOutcome};
