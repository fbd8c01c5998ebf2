//! Post-training verification: engine equivalence, serialization round trips
//! and golden models.

pub mod equivalence;
pub mod golden;
pub mod report;
pub mod serialization;

pub use equivalence::{check_engine_equivalence, compare_engines};
pub use golden::{GoldenModelChecker, semantic_digest, write_golden_model};
pub use report::{SkippedEngine, VerificationFailure, VerificationReport};
pub use serialization::{check_serialization_roundtrip, reload_model};
