//! Layered configuration loading.
//!
//! Uses `figment` for layering: built-in defaults -> `modelcheck.toml` in the
//! workspace directory -> `MODELCHECK_` environment variables -> explicit
//! overrides. The harness configuration type itself lives in the domain crate;
//! this module only knows how to stack the providers.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::persistence::atomic_write;

/// Name of the workspace-level configuration file.
pub const CONFIG_FILE_NAME: &str = "modelcheck.toml";

/// Prefix of environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "MODELCHECK_";

/// Load a configuration of type `T` from all layers.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (`MODELCHECK_METRIC__DUMP_DIR`, ...)
/// 3. Workspace config (`<workspace>/modelcheck.toml`)
/// 4. `T::default()`
pub fn load_config<T>(workspace: Option<&Path>, overrides: Option<&T>) -> Result<T, CoreError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            tracing::debug!(path = %ws_config.display(), "Merging workspace config");
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| CoreError::Config(Box::new(e)))
}

/// Whether a workspace configuration file exists.
pub fn config_exists(workspace: &Path) -> bool {
    workspace.join(CONFIG_FILE_NAME).exists()
}

/// Parse a configuration from TOML text layered over `T::default()`.
pub fn parse_config_str<T>(toml_text: &str) -> Result<T, CoreError>
where
    T: Default + Serialize + DeserializeOwned,
{
    Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::string(toml_text))
        .extract()
        .map_err(|e| CoreError::Config(Box::new(e)))
}

/// Write `config` as the workspace `modelcheck.toml`, returning its path.
pub fn save_config<T: Serialize>(workspace: &Path, config: &T) -> Result<PathBuf, CoreError> {
    let config_path = workspace.join(CONFIG_FILE_NAME);
    let toml_str = toml::to_string_pretty(config)?;
    atomic_write(&config_path, toml_str.as_bytes())
        .map_err(|e| CoreError::persistence(&config_path, e))?;
    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        ratio: f64,
        shards: usize,
        nested: Nested,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Nested {
        enabled: bool,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                ratio: 0.5,
                shards: 3,
                nested: Nested { enabled: false },
            }
        }
    }

    #[test]
    fn test_defaults_without_workspace() {
        let cfg: Sample = load_config(None, None).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_workspace_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "shards = 5\n[nested]\nenabled = true\n",
        )
        .unwrap();
        assert!(config_exists(dir.path()));

        let cfg: Sample = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(cfg.shards, 5);
        assert!(cfg.nested.enabled);
        assert_eq!(cfg.ratio, 0.5);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "shards = 5\n").unwrap();
        let overrides = Sample {
            ratio: 0.8,
            shards: 7,
            nested: Nested { enabled: true },
        };
        let cfg: Sample = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(cfg, overrides);
    }

    #[test]
    fn test_parse_config_str_rejects_bad_types() {
        let err = parse_config_str::<Sample>("shards = \"many\"").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let saved = Sample {
            ratio: 0.25,
            shards: 2,
            nested: Nested { enabled: true },
        };
        let path = save_config(dir.path(), &saved).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
        let cfg: Sample = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(cfg, saved);
    }
}
