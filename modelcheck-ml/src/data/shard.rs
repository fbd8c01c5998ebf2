//! Writing a dataset as a set of shard files.

use crate::data::dataset::Dataset;
use crate::data::format::{DatasetFormat, TypedPath, write_rows};
use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::Path;

/// Seed of the row selection when subsampling.
const SHARD_SAMPLING_SEED: u64 = 0x5eed_5a4d;

/// Rows kept when sharding with `sampling`: `round(nrow * sampling)` rows, in
/// original order.
pub fn shard_selection(nrow: usize, sampling: f64) -> Vec<usize> {
    let count = ((nrow as f64) * sampling).round() as usize;
    let mut rows: Vec<usize> = (0..nrow).collect();
    if count < nrow {
        rows.shuffle(&mut StdRng::seed_from_u64(SHARD_SAMPLING_SEED));
        rows.truncate(count);
        rows.sort_unstable();
    }
    rows
}

/// Write `dataset` as `num_shards` files under `dir` and return the sharded path.
///
/// The i-th selected row goes to shard `i % num_shards`, so every selected row
/// lands in exactly one shard.
pub fn shard_dataset(
    dataset: &Dataset,
    num_shards: usize,
    sampling: f64,
    format: DatasetFormat,
    name: &str,
    dir: &Path,
) -> Result<TypedPath, MlError> {
    if num_shards == 0 {
        return Err(MlError::config("cannot shard a dataset into zero shards"));
    }
    if !(sampling > 0.0 && sampling <= 1.0) {
        return Err(MlError::config(format!(
            "shard sampling must be in (0, 1], got {sampling}"
        )));
    }
    let selected = shard_selection(dataset.nrow(), sampling);
    let mut per_shard = vec![Vec::new(); num_shards];
    for (i, &row) in selected.iter().enumerate() {
        per_shard[i % num_shards].push(row);
    }

    let path = TypedPath::sharded(format, dir.join(format!("{name}{}", format.extension())), num_shards);
    for (rows, file) in per_shard.iter().zip(path.files()) {
        write_rows(dataset, rows, format, &file)?;
    }
    tracing::info!(
        path = %path,
        rows = selected.len(),
        num_shards,
        "Sharded dataset"
    );
    Ok(path)
}
