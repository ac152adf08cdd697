//! Configuration schema for sqlmate chat storage.

use serde::{Deserialize, Serialize};

/// Root of `sqlmate.json5`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SqlmateConfig {
    /// Editor schema hint; ignored by the loader.
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub eviction: EvictionConfig,
}

impl SqlmateConfig {
    pub fn builder() -> SqlmateConfigBuilder {
        SqlmateConfigBuilder::default()
    }
}

/// Assembles a [`SqlmateConfig`] in code, starting from defaults.
#[derive(Debug, Default, Clone)]
pub struct SqlmateConfigBuilder {
    config: SqlmateConfig,
}

impl SqlmateConfigBuilder {
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn eviction(mut self, eviction: EvictionConfig) -> Self {
        self.config.eviction = eviction;
        self
    }

    /// Shorthand for setting only the byte budget.
    pub fn capacity_bytes(mut self, capacity_bytes: u64) -> Self {
        self.config.storage.capacity_bytes = Some(capacity_bytes);
        self
    }

    pub fn build(self) -> SqlmateConfig {
        self.config
    }
}

/// Where and how chat history is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Data directory for the file-backed store.
    #[serde(default)]
    pub path: Option<String>,
    /// Optional byte budget; writes beyond it fail with capacity exceeded.
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    /// Compress stored documents with zlib.
    #[serde(default)]
    pub compress: bool,
}

/// Limits applied by the quota-aware save coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvictionConfig {
    /// Chats deleted per eviction round.
    #[serde(default = "default_chat_batch")]
    pub chat_batch: usize,
    /// Messages removed per pruning pass on the protected chat.
    #[serde(default = "default_prune_batch")]
    pub prune_batch: usize,
    /// Attempts allowed beyond the eviction and pruning rounds the stored
    /// data needs, for a single coordinated write.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            chat_batch: default_chat_batch(),
            prune_batch: default_prune_batch(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_chat_batch() -> usize {
    5
}

fn default_prune_batch() -> usize {
    100
}

fn default_max_attempts() -> usize {
    64
}
