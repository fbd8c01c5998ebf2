//! Epoch-boundary callbacks: early stopping and the cooperative deadline.

use crate::training::deadline::StopSignal;
use crate::training::metrics::TrainingMetrics;

/// Action a callback can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Called by learners at the end of each epoch.
pub trait TrainingCallback: Send {
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;
}

/// Stop when the monitored loss has not improved for `patience` epochs.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub min_delta: f64,
    counter: usize,
    best_loss: Option<f64>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        match self.best_loss {
            Some(best) if loss >= best - self.min_delta => {
                self.counter += 1;
                if self.counter >= self.patience {
                    CallbackAction::Stop
                } else {
                    CallbackAction::Continue
                }
            }
            _ => {
                self.best_loss = Some(loss);
                self.counter = 0;
                CallbackAction::Continue
            }
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.monitored_loss() {
            Some(loss) if loss.is_finite() => self.observe(loss),
            _ => CallbackAction::Stop,
        }
    }
}

/// Stop once the stop signal is raised.
#[derive(Debug, Clone)]
pub struct DeadlineCallback {
    signal: StopSignal,
}

impl DeadlineCallback {
    pub fn new(signal: StopSignal) -> Self {
        Self { signal }
    }
}

impl TrainingCallback for DeadlineCallback {
    fn on_epoch_end(&mut self, epoch: usize, _metrics: &TrainingMetrics) -> CallbackAction {
        if self.signal.is_raised() {
            tracing::debug!(epoch, "Stop signal raised, ending training");
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }
}
