//! Training: configuration, learners, the orchestrator and the preset sweep.

pub mod callbacks;
pub mod config;
pub mod deadline;
pub mod learner;
pub mod metrics;
pub mod orchestrator;
pub mod sweep;

pub use config::{HyperParameterPreset, HyperParameterValue, HyperParameters, TrainingConfig};
pub use deadline::{DeadlineGuard, StopSignal};
pub use learner::{DatasetInput, Learner, LearnerRegistry, TrainingRequest};
pub use orchestrator::{PreStartHook, TrainedModel, TrainingOrchestrator, TrainingRun};
pub use sweep::{
    HyperparamSweep, SweepData, SweepOptions, SweepTrial, TrialStatus,
    run_predefined_hyperparameters, run_predefined_hyperparameters_on_synthetic_ranking,
    run_predefined_hyperparameters_with_loaders,
};
