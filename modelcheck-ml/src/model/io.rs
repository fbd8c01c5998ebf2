//! Model persistence: directory and byte forms, dispatched by model kind.
//!
//! Both forms carry a small header (`kind`, `task`, `label`) in front of the
//! representation-specific payload. The header selects the loader; the loader
//! owns the payload.

use crate::error::{MlError, io_at};
use crate::model::{Model, Task};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// File holding the header of a model directory.
pub const HEADER_FILE_NAME: &str = "header.json";

/// The two persisted forms of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationForm {
    Directory,
    Bytes,
}

impl SerializationForm {
    pub const ALL: [Self; 2] = [Self::Directory, Self::Bytes];
}

impl fmt::Display for SerializationForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Bytes => f.write_str("bytes"),
        }
    }
}

/// Header written in front of every persisted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHeader {
    pub kind: String,
    pub task: Task,
    pub label: String,
}

impl ModelHeader {
    pub fn of(model: &dyn Model) -> Self {
        Self {
            kind: model.kind().to_string(),
            task: model.task(),
            label: model.label().to_string(),
        }
    }

    fn check(&self, model: &dyn Model) -> Result<(), MlError> {
        let loaded = Self::of(model);
        if *self != loaded {
            return Err(MlError::model(format!(
                "loaded model {loaded:?} does not match its header {self:?}"
            )));
        }
        Ok(())
    }
}

/// Rebuilds models of one kind from their persisted payload.
pub trait ModelLoader: Send + Sync {
    fn kind(&self) -> &str;

    fn load_directory(&self, dir: &Path) -> Result<Box<dyn Model>, MlError>;

    fn from_bytes(&self, bytes: &[u8]) -> Result<Box<dyn Model>, MlError>;
}

/// Loaders keyed by model kind.
#[derive(Default)]
pub struct ModelLoaderRegistry {
    loaders: HashMap<String, Box<dyn ModelLoader>>,
}

impl ModelLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing every model kind shipped with this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::linear::LinearModelLoader));
        registry
    }

    pub fn register(&mut self, loader: Box<dyn ModelLoader>) {
        self.loaders.insert(loader.kind().to_string(), loader);
    }

    pub fn get(&self, kind: &str) -> Result<&dyn ModelLoader, MlError> {
        self.loaders
            .get(kind)
            .map(|l| l.as_ref())
            .ok_or_else(|| MlError::model(format!("no loader registered for model kind \"{kind}\"")))
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for ModelLoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoaderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Save `model` into `dir`, creating it if needed.
///
/// The header is written last so a directory with a header is always complete.
pub fn save_model(model: &dyn Model, dir: &Path) -> Result<(), MlError> {
    std::fs::create_dir_all(dir).map_err(|e| io_at(dir, e))?;
    model.save_to_directory(dir)?;
    let header_path = dir.join(HEADER_FILE_NAME);
    modelcheck_core::persistence::atomic_write_json(&header_path, &ModelHeader::of(model))
        .map_err(|e| io_at(&header_path, e))?;
    tracing::debug!(kind = model.kind(), dir = %dir.display(), "Saved model");
    Ok(())
}

/// Load the model stored in `dir`.
pub fn load_model(dir: &Path, registry: &ModelLoaderRegistry) -> Result<Box<dyn Model>, MlError> {
    let header_path = dir.join(HEADER_FILE_NAME);
    let header: ModelHeader = modelcheck_core::persistence::load_json(&header_path)
        .map_err(|e| io_at(&header_path, e))?
        .ok_or_else(|| MlError::not_found(format!("no model in {}", dir.display())))?;
    let model = registry.get(&header.kind)?.load_directory(dir)?;
    header.check(model.as_ref())?;
    Ok(model)
}

/// Serialize `model` as `u32 LE header length | header JSON | payload`.
pub fn serialize_model(model: &dyn Model) -> Result<Vec<u8>, MlError> {
    let header = serde_json::to_vec(&ModelHeader::of(model))?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| MlError::model("model header too large"))?;
    let payload = model.to_bytes()?;
    let mut bytes = Vec::with_capacity(4 + header.len() + payload.len());
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Inverse of [`serialize_model`].
pub fn deserialize_model(
    bytes: &[u8],
    registry: &ModelLoaderRegistry,
) -> Result<Box<dyn Model>, MlError> {
    let (len_bytes, rest) = bytes
        .split_first_chunk::<4>()
        .ok_or_else(|| MlError::model("serialized model is truncated"))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(MlError::model("serialized model header is truncated"));
    }
    let (header, payload) = rest.split_at(header_len);
    let header: ModelHeader = serde_json::from_slice(header)?;
    let model = registry.get(&header.kind)?.from_bytes(payload)?;
    header.check(model.as_ref())?;
    Ok(model)
}
