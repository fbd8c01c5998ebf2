//! Per-epoch training loss tracking.

use serde::{Deserialize, Serialize};

/// Loss history of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    /// 1-based epoch with the lowest monitored loss.
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
}

impl TrainingMetrics {
    /// Record an epoch. The validation loss, when present, is the monitored loss.
    pub fn record_epoch(&mut self, loss: f64, val_loss: Option<f64>) {
        self.loss_history.push(loss);
        if let Some(vl) = val_loss {
            self.val_loss_history.push(vl);
        }
        self.epochs_completed += 1;

        let monitored = val_loss.unwrap_or(loss);
        if self.best_loss.is_none_or(|best| monitored < best) {
            self.best_loss = Some(monitored);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    /// Whether the last recorded epoch is the best so far.
    pub fn last_is_best(&self) -> bool {
        self.epochs_completed > 0 && self.best_epoch == Some(self.epochs_completed)
    }

    /// Loss watched by callbacks: last validation loss, else last training loss.
    pub fn monitored_loss(&self) -> Option<f64> {
        self.val_loss_history
            .last()
            .or(self.loss_history.last())
            .copied()
    }
}
