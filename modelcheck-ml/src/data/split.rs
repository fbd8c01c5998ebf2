//! Deterministic train / validation / test partitioning.

use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Row indices of each fold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
    pub test: Vec<usize>,
}

/// Whether the example at position `p` of the ordering belongs to the training fold.
///
/// Spreads `ceil(n * ratio)` training rows evenly over the ordering; with a
/// ratio of 0.5 this selects exactly the even positions.
fn is_training_position(p: usize, ratio: f64) -> bool {
    ((p + 1) as f64 * ratio).ceil() > (p as f64 * ratio).ceil()
}

/// Partition `nrow` rows.
///
/// Without `noise_seed`, the ordering is the row order itself. With it, rows are
/// first permuted by a shuffle seeded with that value. Non-training rows go to
/// the test fold, or alternate test / validation when `with_validation` is set.
pub fn split_indices(
    nrow: usize,
    ratio: f64,
    with_validation: bool,
    noise_seed: Option<u64>,
) -> Result<SplitIndices, MlError> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(MlError::config(format!(
            "training ratio must be in (0, 1], got {ratio}"
        )));
    }
    let mut ordering: Vec<usize> = (0..nrow).collect();
    if let Some(seed) = noise_seed {
        ordering.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    let mut split = SplitIndices::default();
    let mut held_out = 0usize;
    for (p, &row) in ordering.iter().enumerate() {
        if is_training_position(p, ratio) {
            split.train.push(row);
        } else {
            if with_validation && held_out % 2 == 1 {
                split.valid.push(row);
            } else {
                split.test.push(row);
            }
            held_out += 1;
        }
    }
    Ok(split)
}

/// Deterministic stride subsample keeping `floor(nrow * sampling)` rows in order.
pub fn sample_indices(nrow: usize, sampling: f64) -> Vec<usize> {
    if sampling >= 1.0 {
        return (0..nrow).collect();
    }
    (0..nrow)
        .filter(|&i| ((i + 1) as f64 * sampling).floor() > (i as f64 * sampling).floor())
        .collect()
}
