//! Drives one learner call: validation, learner resolution, seeding, deadline
//! and the pre-start hook.

use crate::data::schema::DataSpecification;
use crate::error::MlError;
use crate::model::Model;
use crate::training::config::TrainingConfig;
use crate::training::deadline::{DeadlineGuard, StopSignal};
use crate::training::learner::{DatasetInput, LearnerRegistry, TrainingRequest};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Callback invoked right before the learner starts.
pub type PreStartHook<'a> = Box<dyn FnOnce() + 'a>;

/// Inputs of one training run.
pub struct TrainingRun<'a> {
    pub config: TrainingConfig,
    pub spec: &'a DataSpecification,
    pub train: DatasetInput<'a>,
    pub valid: Option<DatasetInput<'a>>,
    /// Interrupt training after this duration, on top of the configured maximum.
    pub interrupt_after: Option<Duration>,
    /// Replace the configured seed with a freshly drawn one.
    pub change_random_seed: bool,
    pub pre_start_hook: Option<PreStartHook<'a>>,
}

impl<'a> TrainingRun<'a> {
    pub fn new(config: TrainingConfig, spec: &'a DataSpecification, train: DatasetInput<'a>) -> Self {
        Self {
            config,
            spec,
            train,
            valid: None,
            interrupt_after: None,
            change_random_seed: false,
            pre_start_hook: None,
        }
    }

    pub fn with_validation(mut self, valid: DatasetInput<'a>) -> Self {
        self.valid = Some(valid);
        self
    }

    pub fn with_hook(mut self, hook: impl FnOnce() + 'a) -> Self {
        self.pre_start_hook = Some(Box::new(hook));
        self
    }

    fn deadline(&self) -> Option<Duration> {
        let configured = self
            .config
            .maximum_training_duration_secs
            .map(Duration::from_secs_f64);
        match (configured, self.interrupt_after) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Result of a training run.
#[derive(Debug)]
pub struct TrainedModel {
    pub model: Box<dyn Model>,
    pub training_duration: Duration,
    /// Seed the learner was trained with.
    pub seed: u64,
    /// Whether the deadline stopped training before the learner finished.
    pub interrupted: bool,
}

/// Runs learners resolved from a registry.
#[derive(Debug)]
pub struct TrainingOrchestrator {
    registry: LearnerRegistry,
}

impl Default for TrainingOrchestrator {
    fn default() -> Self {
        Self::new(LearnerRegistry::with_defaults())
    }
}

impl TrainingOrchestrator {
    pub fn new(registry: LearnerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &LearnerRegistry {
        &self.registry
    }

    /// Train a model.
    ///
    /// Configuration problems are reported before the learner is created; the
    /// hook runs only once everything is in place.
    pub fn train(&self, run: TrainingRun<'_>) -> Result<TrainedModel, MlError> {
        let deadline = run.deadline();
        let TrainingRun {
            mut config,
            spec,
            train,
            valid,
            change_random_seed,
            pre_start_hook,
            ..
        } = run;

        config.validate(spec)?;
        let mut learner = self.registry.create(&config.learner)?;
        learner.set_hyperparameters(&config.hyperparameters)?;

        if change_random_seed {
            config.random_seed = rand::thread_rng().gen_range(0..u64::MAX);
            info!(seed = config.random_seed, "Using a freshly drawn random seed");
        }

        let stop = StopSignal::new();
        let guard = deadline.map(|after| {
            debug!(after_secs = after.as_secs_f64(), "Arming training deadline");
            DeadlineGuard::arm(stop.clone(), after)
        });

        if let Some(hook) = pre_start_hook {
            hook();
        }

        info!(
            learner = learner.name(),
            task = %config.task,
            label = %config.label,
            train = %train,
            has_validation = valid.is_some(),
            "Training model"
        );
        let start = Instant::now();
        let model = learner.train(TrainingRequest {
            config: &config,
            spec,
            train,
            valid,
            stop: stop.clone(),
        })?;
        let training_duration = start.elapsed();
        // The model reports whether the learner saw the signal; a watchdog
        // firing after the learner returned does not count.
        drop(guard);
        let interrupted = model.interrupted();
        info!(
            duration_secs = training_duration.as_secs_f64(),
            interrupted,
            kind = model.kind(),
            "Training done"
        );

        Ok(TrainedModel {
            model,
            training_duration,
            seed: config.random_seed,
            interrupted,
        })
    }
}
