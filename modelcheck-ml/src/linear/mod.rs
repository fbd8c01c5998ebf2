//! Linear models: softmax regression, least squares and two-model uplift.
//!
//! A deliberately small learner whose models expose one reference engine and
//! two flat specialized engines, enough to exercise every harness check.

pub mod engine;
pub mod learner;
pub mod model;

pub use learner::{LINEAR_LEARNER_NAME, LinearHyperParameters, LinearLearner};
pub use model::{
    FeatureEncoding, Head, InputFeature, LINEAR_MODEL_KIND, LinearModel, LinearModelLoader,
    ModelMetadata,
};
