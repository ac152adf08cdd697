//! Storage and eviction settings for sqlmate, loaded from JSON5 files.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::{EvictionConfig, SqlmateConfig, SqlmateConfigBuilder, StorageConfig};
