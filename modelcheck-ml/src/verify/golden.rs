//! Comparison of trained models with stored golden models.

use crate::config::GoldenConfig;
use crate::error::MlError;
use crate::model::io::{load_model, save_model};
use crate::model::{Model, ModelLoaderRegistry};
use crate::verify::report::{VerificationFailure, VerificationReport};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Hex SHA-256 of the semantic content of a model.
pub fn semantic_digest(model: &dyn Model) -> Result<String, MlError> {
    let mut hasher = Sha256::new();
    hasher.update(model.semantic_bytes()?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checks models against `<root>/<model_name>` when enabled.
#[derive(Debug, Clone)]
pub struct GoldenModelChecker {
    config: GoldenConfig,
}

impl GoldenModelChecker {
    pub fn new(config: GoldenConfig) -> Self {
        Self { config }
    }

    pub fn golden_dir(&self, model_name: &str) -> PathBuf {
        self.config.root.join(model_name)
    }

    /// Compare `model` with its golden counterpart.
    ///
    /// A no-op when disabled. A missing golden directory is a configuration
    /// error; a golden model that cannot be loaded or differs is a failure.
    pub fn check(
        &self,
        model: &dyn Model,
        model_name: &str,
        loaders: &ModelLoaderRegistry,
    ) -> Result<VerificationReport, MlError> {
        if !self.config.enabled {
            debug!(model_name, "Golden model check disabled");
            return Ok(VerificationReport::new());
        }
        let dir = self.golden_dir(model_name);
        if !dir.is_dir() {
            return Err(MlError::config(format!(
                "golden model directory {} does not exist",
                dir.display()
            )));
        }
        let failure = |message: String| {
            VerificationReport::from(VerificationFailure::GoldenModel {
                model_name: model_name.to_string(),
                message,
            })
        };

        let golden = match load_model(&dir, loaders) {
            Ok(golden) => golden,
            Err(e) => return Ok(failure(format!("cannot load {}: {e}", dir.display()))),
        };
        let expected = semantic_digest(golden.as_ref())?;
        let actual = semantic_digest(model)?;
        if expected != actual {
            return Ok(failure(format!(
                "semantic digest {actual} differs from golden digest {expected}"
            )));
        }
        info!(model_name, digest = %actual, "Model matches its golden model");
        Ok(VerificationReport::new())
    }
}

/// Store `model` as the golden model `<root>/<model_name>`.
pub fn write_golden_model(model: &dyn Model, root: &Path, model_name: &str) -> Result<PathBuf, MlError> {
    let dir = root.join(model_name);
    save_model(model, &dir)?;
    info!(model_name, dir = %dir.display(), "Wrote golden model");
    Ok(dir)
}
