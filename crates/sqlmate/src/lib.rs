//! Public SDK surface for sqlmate chat persistence.
//!
//! This crate re-exports the storage and config crates and provides helpers
//! to open a file-backed history from configuration.

/// Re-export for convenience.
pub use sqlmate_config as config;
/// Re-export for convenience.
pub use sqlmate_store as store;

pub use sqlmate_config::{EvictionConfig, SqlmateConfig, StorageConfig};
pub use sqlmate_store::{
    Chat, ChatHistory, FileKvStore, KvStore, MemoryKvStore, Message, MessageRole, StoreError,
};

use anyhow::Context;
use directories::ProjectDirs;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data directory used when neither the caller nor the config names one.
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "sqlmate")
        .map(|dirs| dirs.data_dir().join("history"))
        .unwrap_or_else(|| PathBuf::from(".sqlmate/history"))
}

/// Resolve the history directory: explicit override, then config, then default.
pub fn resolve_data_dir(storage: &StorageConfig, data_dir: Option<&Path>) -> PathBuf {
    data_dir
        .map(Path::to_path_buf)
        .or_else(|| storage.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_data_dir)
}

/// Open a file-backed chat history configured by `config`.
pub fn open_history(config: &SqlmateConfig, data_dir: Option<&Path>) -> anyhow::Result<ChatHistory> {
    let root = resolve_data_dir(&config.storage, data_dir);
    let kv: Arc<dyn KvStore> = Arc::new(
        FileKvStore::open_with(
            &root,
            config.storage.capacity_bytes,
            config.storage.compress,
        )
        .with_context(|| format!("failed to open history store at {}", root.display()))?,
    );
    info!(
        "opened chat history (root={}, chat_batch={}, prune_batch={})",
        root.display(),
        config.eviction.chat_batch,
        config.eviction.prune_batch
    );
    Ok(ChatHistory::with_limits(kv, config.eviction))
}

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::{SqlmateConfig, StorageConfig, open_history, resolve_data_dir};
    use crate::{Chat, Message, MessageRole};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn explicit_data_dir_wins_over_config() {
        let storage = StorageConfig {
            path: Some("/from/config".to_string()),
            ..StorageConfig::default()
        };
        assert_eq!(
            resolve_data_dir(&storage, Some(Path::new("/from/flag"))),
            Path::new("/from/flag")
        );
        assert_eq!(resolve_data_dir(&storage, None), Path::new("/from/config"));
    }

    #[tokio::test]
    async fn opens_configured_store() {
        let temp = tempdir().expect("tempdir");
        let config = SqlmateConfig::builder()
            .storage(StorageConfig {
                path: Some(temp.path().to_string_lossy().to_string()),
                capacity_bytes: None,
                compress: true,
            })
            .build();
        let history = open_history(&config, None).expect("open");
        history
            .save_chat(&Chat::with_id("c1", "Slow queries", None))
            .await
            .expect("save chat");
        history
            .save_message("c1", &Message::text("c1", MessageRole::User, "explain"))
            .await
            .expect("save message");

        let reopened = open_history(&config, None).expect("reopen");
        assert_eq!(reopened.list_messages("c1").await.expect("list").len(), 1);
        assert!(temp.path().join("chats.json.z").exists());
    }
}
