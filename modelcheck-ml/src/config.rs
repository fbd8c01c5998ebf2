//! Configuration types for the modelcheck harness.
//!
//! Everything a test can tweak lives here as plain data: the pipeline reads it,
//! the checkers receive their sub-config at construction, and nothing is a
//! process-wide constant. Load with [`HarnessConfig::load`] to layer a
//! workspace `modelcheck.toml` and `MODELCHECK_*` environment variables on top
//! of the defaults.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Directory containing the datasets referenced by file name.
    #[serde(default = "default_dataset_root")]
    pub dataset_root_directory: PathBuf,
    /// Ratio of the dataset going into the training fold.
    ///
    /// With 0.5 and no noise injection, even rows train and odd rows test.
    #[serde(default = "default_split_ratio")]
    pub split_train_ratio: f64,
    /// Fraction of the dataset kept before splitting.
    #[serde(default = "default_sampling")]
    pub dataset_sampling: f64,
    /// Format used for the temporary datasets written during a test.
    #[serde(default = "default_format")]
    pub preferred_format: String,
    /// Number of shards when datasets are handed to the learner as paths.
    #[serde(default = "default_num_shards")]
    pub num_shards: usize,
    /// Hand the training data to the learner as a sharded path instead of in memory.
    #[serde(default)]
    pub pass_training_dataset_as_path: bool,
    /// Train with a validation dataset carved out of the non-training rows.
    #[serde(default)]
    pub pass_validation_dataset: bool,
    /// Generate a synthetic dataset instead of reading a file.
    #[serde(default)]
    pub use_synthetic_dataset: bool,
    /// Run the post-training checks (serialization, engines, golden model).
    #[serde(default = "default_true")]
    pub check_model: bool,
    /// Include the serialization round trip in the post-training checks.
    #[serde(default = "default_true")]
    pub test_model_serialization: bool,
    /// Log the full model structure instead of a summary.
    #[serde(default)]
    pub show_full_model_structure: bool,
    /// Shuffle the dataset with a seeded permutation before splitting.
    #[serde(default)]
    pub inject_random_noise: bool,
    /// Seed of the noise-injection shuffle.
    #[serde(default = "default_noise_seed")]
    pub noise_seed: u64,
    /// Draw a fresh learner seed for every run.
    #[serde(default)]
    pub change_random_seed: bool,
    /// Loss designated for the learner, overriding its default.
    #[serde(default)]
    pub custom_loss: Option<String>,
    /// Signal the learner to stop after this many seconds.
    #[serde(default)]
    pub interrupt_training_after_secs: Option<f64>,
    /// Metric assertion configuration.
    #[serde(default)]
    pub metric: MetricCheckConfig,
    /// Golden model configuration.
    #[serde(default)]
    pub golden: GoldenConfig,
    /// Engine equivalence configuration.
    #[serde(default)]
    pub equivalence: EquivalenceConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            dataset_root_directory: default_dataset_root(),
            split_train_ratio: default_split_ratio(),
            dataset_sampling: default_sampling(),
            preferred_format: default_format(),
            num_shards: default_num_shards(),
            pass_training_dataset_as_path: false,
            pass_validation_dataset: false,
            use_synthetic_dataset: false,
            check_model: true,
            test_model_serialization: true,
            show_full_model_structure: false,
            inject_random_noise: false,
            noise_seed: default_noise_seed(),
            change_random_seed: false,
            custom_loss: None,
            interrupt_training_after_secs: None,
            metric: MetricCheckConfig::default(),
            golden: GoldenConfig::default(),
            equivalence: EquivalenceConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load the configuration for a workspace directory.
    pub fn load(workspace: Option<&Path>) -> Result<Self, MlError> {
        let config: Self = modelcheck_core::load_config(workspace, None)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration as the workspace `modelcheck.toml`.
    pub fn save(&self, workspace: &Path) -> Result<PathBuf, MlError> {
        self.validate()?;
        Ok(modelcheck_core::save_config(workspace, self)?)
    }

    /// Reject values no pipeline can run with.
    pub fn validate(&self) -> Result<(), MlError> {
        if !(self.split_train_ratio > 0.0 && self.split_train_ratio <= 1.0) {
            return Err(MlError::config(format!(
                "split_train_ratio must be in (0, 1], got {}",
                self.split_train_ratio
            )));
        }
        if !(self.dataset_sampling > 0.0 && self.dataset_sampling <= 1.0) {
            return Err(MlError::config(format!(
                "dataset_sampling must be in (0, 1], got {}",
                self.dataset_sampling
            )));
        }
        if self.num_shards == 0 {
            return Err(MlError::config("num_shards must be positive"));
        }
        if let Some(secs) = self.interrupt_training_after_secs {
            if !(secs >= 0.0 && secs.is_finite()) {
                return Err(MlError::config(format!(
                    "interrupt_training_after_secs must be a finite non-negative number, got {secs}"
                )));
            }
        }
        self.equivalence.validate()
    }
}

fn default_dataset_root() -> PathBuf {
    PathBuf::from("test_data/dataset")
}

fn default_split_ratio() -> f64 {
    0.5
}

fn default_sampling() -> f64 {
    1.0
}

fn default_format() -> String {
    "tfrecord".to_string()
}

fn default_num_shards() -> usize {
    3
}

fn default_noise_seed() -> u64 {
    1234
}

/// Metric assertion configuration.
///
/// When `dump_dir` is set, assertions record their values instead of checking
/// them, and the gold check is suppressed along with the margin check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricCheckConfig {
    /// Directory receiving one CSV file of metric records per test.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    /// Also require metrics to equal their recorded gold value.
    #[serde(default)]
    pub check_gold: bool,
}

/// Golden model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenConfig {
    /// Compare trained models against stored golden artifacts.
    #[serde(default)]
    pub enabled: bool,
    /// Directory holding one golden model directory per model name.
    #[serde(default = "default_golden_root")]
    pub root: PathBuf,
}

impl Default for GoldenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: default_golden_root(),
        }
    }
}

fn default_golden_root() -> PathBuf {
    PathBuf::from("test_data/golden")
}

/// Engine equivalence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceConfig {
    /// Number of examples handed to an engine per call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Absolute tolerance between reference and specialized predictions.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            tolerance: default_tolerance(),
        }
    }
}

impl EquivalenceConfig {
    pub fn validate(&self) -> Result<(), MlError> {
        if self.batch_size == 0 {
            return Err(MlError::config("equivalence.batch_size must be positive"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(MlError::config("equivalence.tolerance must be non-negative"));
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_tolerance() -> f32 {
    1e-5
}

fn default_true() -> bool {
    true
}
