//! # modelcheck-ml: end-to-end verification of trained models
//!
//! Drives a training run, evaluates the result, then checks that the model
//! behaves the same through every way it can be used:
//!
//! 1. **Engines**: every specialized inference engine agrees with the
//!    reference engine on every row, batch by batch.
//! 2. **Serialization**: a model reloaded from either persisted form predicts
//!    bit-identically.
//! 3. **Golden models**: optionally, a model matches a stored artifact.
//!
//! Metric assertions check evaluation values against expected ranges, or
//! record them for recalibration in dump mode.

// Foundation
pub mod config;
pub mod error;

// Data
pub mod data;

// Models and learners
pub mod linear;
pub mod model;
pub mod training;

// Evaluation
pub mod evaluation;
pub mod importance;
pub mod uplift;

// Verification
pub mod metric;
pub mod tester;
pub mod verify;

// Re-exports
pub use config::{EquivalenceConfig, GoldenConfig, HarnessConfig, MetricCheckConfig};
pub use error::MlError;
pub use evaluation::{EvaluationOptions, EvaluationResult, Evaluator, StandardEvaluator};
pub use metric::{MetricAssertion, MetricChecker, MetricOutcome};
pub use model::{BatchPredict, EngineAvailability, ExampleBatch, Model, Prediction, Task};
pub use tester::TrainAndTestTester;
pub use training::{TrainingConfig, TrainingOrchestrator};
pub use verify::{VerificationFailure, VerificationReport};
