//! Config loading: single files, or a stack of layers merged in precedence
//! order (user, working directory, runtime overrides).

mod discovery;
mod schema;


use crate::{ConfigError, SqlmateConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory and the user config dir.
const DEFAULT_CONFIG_FILE: &str = "sqlmate.json5";
/// User config directory, relative to the home directory.
const DEFAULT_CONFIG_DIR: &str = ".sqlmate";

/// Result of a layered load.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: SqlmateConfig,
    /// Layers that were found and applied, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    User,
    Cwd,
    Runtime,
}

/// A layer that contributed to a [`LayeredConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Layer locations for [`SqlmateConfig::load_layered_with_options`].
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Directory searched for `sqlmate.json5`.
    pub cwd: PathBuf,
    /// User layer; `None` disables it.
    pub user_config_path: Option<PathBuf>,
    /// Override files applied after every other layer, in order.
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// User layer at its default location plus `cwd`; no overrides.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: discovery::user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl SqlmateConfig {
    /// Read one JSON5 file without layering.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config (path={})", path.display());
        Self::load_from_str(&fs::read_to_string(path)?)
    }

    /// Parse JSON5 text without layering.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations.
    ///
    /// Later layers win. Missing user and cwd layers are skipped; every
    /// runtime layer must exist.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let candidates = discovery::candidates(
            &options.cwd,
            options.user_config_path.as_deref(),
            &options.runtime_paths,
        );
        let mut applied = HashSet::new();
        let mut merged = Value::Object(serde_json::Map::new());
        let mut layers = Vec::new();
        for candidate in candidates {
            if !applied.insert(candidate.identity()) {
                debug!("config layer already applied (path={})", candidate.path.display());
                continue;
            }
            if let Some((meta, value)) = candidate.read()? {
                discovery::overlay(&mut merged, value);
                layers.push(meta);
            }
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Reject limits that would stall the save coordinator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("eviction.chat_batch", self.eviction.chat_batch),
            ("eviction.prune_batch", self.eviction.prune_batch),
            ("eviction.max_attempts", self.eviction.max_attempts),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, count)| *count == 0) {
            return Err(ConfigError::InvalidLimits(format!("{name} must be at least 1")));
        }
        if self.storage.capacity_bytes == Some(0) {
            return Err(ConfigError::InvalidLimits(
                "storage.capacity_bytes must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn config_from_value(value: Value, label: &str) -> Result<SqlmateConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: SqlmateConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
