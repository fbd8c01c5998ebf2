//! Emulation of example weights by row duplication.
//!
//! Lets a learner that ignores weights see an approximately weighted sample:
//! each row appears `floor(weight / max_weight * MAX_DUPLICATES)` times.

use crate::data::dataset::Dataset;
use crate::error::MlError;

/// Copies given to the heaviest row.
pub const MAX_DUPLICATES: f32 = 10.0;

/// Number of copies of each row.
pub fn duplication_counts(weights: &[Option<f32>]) -> Result<Vec<usize>, MlError> {
    let mut max_weight = 0f32;
    for (row, w) in weights.iter().enumerate() {
        match w {
            Some(w) if w.is_finite() && *w >= 0.0 => max_weight = max_weight.max(*w),
            Some(w) => {
                return Err(MlError::config(format!(
                    "invalid weight {w} at row {row}; weights must be finite and non-negative"
                )));
            }
            None => {
                return Err(MlError::config(format!("missing weight at row {row}")));
            }
        }
    }
    if max_weight <= 0.0 {
        return Err(MlError::config("all weights are zero"));
    }
    Ok(weights
        .iter()
        .map(|w| (w.unwrap_or(0.0) / max_weight * MAX_DUPLICATES).floor() as usize)
        .collect())
}

/// Replicate rows according to the numerical `weight_column`, keeping row order.
pub fn emulate_weights_by_duplication(
    dataset: &Dataset,
    weight_column: &str,
) -> Result<Dataset, MlError> {
    let weights = dataset.numerical(weight_column).map_err(|e| {
        MlError::config(format!("cannot emulate weights with \"{weight_column}\": {e}"))
    })?;
    let counts = duplication_counts(weights)?;
    let indices: Vec<usize> = counts
        .iter()
        .enumerate()
        .flat_map(|(row, &copies)| std::iter::repeat_n(row, copies))
        .collect();
    tracing::info!(
        weight_column,
        rows_before = dataset.nrow(),
        rows_after = indices.len(),
        "Emulated example weights by duplication"
    );
    dataset.extract_rows(&indices)
}
