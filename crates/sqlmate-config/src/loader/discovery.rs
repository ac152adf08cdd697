//! Locating, reading and stacking config layers.

use super::{ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A place a layer may be read from.
pub(super) struct Candidate {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
    /// Missing required layers are an error; missing optional ones are skipped.
    pub required: bool,
}

impl Candidate {
    fn label(&self) -> String {
        let source = match self.source {
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Runtime => "runtime",
        };
        format!("{source}({})", self.path.display())
    }

    /// Canonical path, so the same file reached twice is only applied once.
    pub fn identity(&self) -> PathBuf {
        fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone())
    }

    /// Read and shape-check the layer; `None` for an absent optional layer.
    pub fn read(&self) -> Result<Option<(ConfigLayer, Value)>, ConfigError> {
        if !self.required && !self.path.exists() {
            debug!("config layer absent (source={:?}, path={})", self.source, self.path.display());
            return Ok(None);
        }
        debug!("reading config layer (source={:?}, path={})", self.source, self.path.display());
        let value: Value = json5::from_str(&fs::read_to_string(&self.path)?)?;
        schema::validate_layer_schema(&value, &self.label())?;
        let meta = ConfigLayer {
            source: self.source,
            path: self.path.clone(),
        };
        Ok(Some((meta, value)))
    }
}

/// `~/.sqlmate/sqlmate.json5`, when a home directory can be resolved.
pub(super) fn user_config_path() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    Some(dirs.home_dir().join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
}

/// Candidates in precedence order, lowest first.
pub(super) fn candidates(
    cwd: &Path,
    user: Option<&Path>,
    runtime: &[PathBuf],
) -> Vec<Candidate> {
    let optional = user
        .map(|path| (ConfigLayerSource::User, path.to_path_buf()))
        .into_iter()
        .chain([(ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE))])
        .map(|(source, path)| Candidate {
            source,
            path,
            required: false,
        });
    let overrides = runtime.iter().map(|path| Candidate {
        source: ConfigLayerSource::Runtime,
        path: path.clone(),
        required: true,
    });
    optional.chain(overrides).collect()
}

/// Apply `top` over `base`: objects combine per key, other values replace.
pub(super) fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(lower), Value::Object(upper)) => {
            for (key, value) in upper {
                match lower.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        lower.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
