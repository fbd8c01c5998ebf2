//! Predictions produced by inference engines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One prediction, shaped by the task of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prediction {
    /// Probability of each class, in the model's class order.
    Classification { probabilities: Vec<f32> },
    Regression { value: f32 },
    Ranking { relevance: f32 },
    /// Estimated effect of each treatment relative to control.
    Uplift { treatment_effect: Vec<f32> },
}

impl Prediction {
    /// Flat view of the predicted values.
    pub fn values(&self) -> &[f32] {
        match self {
            Self::Classification { probabilities } => probabilities,
            Self::Regression { value } => std::slice::from_ref(value),
            Self::Ranking { relevance } => std::slice::from_ref(relevance),
            Self::Uplift { treatment_effect } => treatment_effect,
        }
    }

    /// Largest absolute difference with `other`, or `None` if the two are not
    /// comparable (different kind or length).
    pub fn max_abs_diff(&self, other: &Self) -> Option<f32> {
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            return None;
        }
        let (a, b) = (self.values(), other.values());
        if a.len() != b.len() {
            return None;
        }
        Some(
            a.iter()
                .zip(b)
                .map(|(x, y)| if x == y { 0.0 } else { (x - y).abs() })
                .fold(0.0, |acc: f32, d| {
                    if acc.is_nan() || d.is_nan() {
                        f32::NAN
                    } else {
                        acc.max(d)
                    }
                }),
        )
    }

    /// Bit-level equality, treating identical NaNs as equal.
    pub fn bit_equal(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.values().len() == other.values().len()
            && self
                .values()
                .iter()
                .zip(other.values())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification { probabilities } => write!(f, "probabilities {probabilities:?}"),
            Self::Regression { value } => write!(f, "value {value}"),
            Self::Ranking { relevance } => write!(f, "relevance {relevance}"),
            Self::Uplift { treatment_effect } => write!(f, "uplift {treatment_effect:?}"),
        }
    }
}
