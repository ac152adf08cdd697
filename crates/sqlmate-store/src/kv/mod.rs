//! Key-value substrate abstraction and document layout.
//!
//! The engine persists three independent namespaces:
//!
//! - `chats`: one document mapping chat id to chat record.
//! - `messages/<chat_id>`: one child document per chat, mapping message id
//!   to message record.
//! - `hidden-actions/<chat_id>`: one child document per chat, mapping
//!   message id to a hidden marker.

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use crate::error::{KvError, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key of the chat index document.
pub const CHATS_KEY: &str = "chats";
/// Namespace holding one message document per chat.
pub const MESSAGES_NAMESPACE: &str = "messages";
/// Namespace holding one hidden-action document per chat.
pub const HIDDEN_ACTIONS_NAMESPACE: &str = "hidden-actions";

/// Build the key of a child document inside a namespace.
pub fn child_key(namespace: &str, child: &str) -> String {
    format!("{namespace}/{child}")
}

/// Space accounting reported by a substrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KvUsage {
    /// Bytes currently attributed to stored documents.
    pub used_bytes: u64,
    /// Byte budget, if the substrate enforces one.
    pub capacity_bytes: Option<u64>,
}

#[async_trait]
/// Namespaced JSON document storage with a distinguishable quota failure.
///
/// Implementations must return [`KvError::CapacityExceeded`] when a write
/// does not fit, and must accept writes that shrink a document.
pub trait KvStore: Send + Sync {
    /// Read a document; missing keys resolve to `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError>;

    /// Create or replace a document.
    async fn set(&self, key: &str, value: Value) -> Result<(), KvError>;

    /// Remove a document; removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), KvError>;

    /// List the child names stored directly under a namespace.
    async fn list_children(&self, namespace: &str) -> Result<Vec<String>, KvError>;

    /// Report current space usage.
    async fn usage(&self) -> Result<KvUsage, KvError>;
}

/// Load a map document, treating a missing key as empty.
pub(crate) async fn load_map<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> Result<BTreeMap<String, T>, StoreError> {
    match kv.get(key).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(BTreeMap::new()),
    }
}

/// Persist a map document; an empty map removes the document entirely.
pub(crate) async fn store_map<T: Serialize>(
    kv: &dyn KvStore,
    key: &str,
    map: &BTreeMap<String, T>,
) -> Result<(), StoreError> {
    if map.is_empty() {
        kv.remove(key).await?;
        return Ok(());
    }
    kv.set(key, serde_json::to_value(map)?).await?;
    Ok(())
}

/// Split a key into validated path segments.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, KvError> {
    let segments: Vec<&str> = key.split('/').collect();
    let valid = segments.iter().all(|segment| {
        !segment.is_empty()
            && *segment != "."
            && *segment != ".."
            && !segment.contains('\\')
            && !segment.contains('\0')
    });
    if !valid {
        return Err(KvError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::{
        CHATS_KEY, KvStore, MESSAGES_NAMESPACE, MemoryKvStore, child_key, key_segments, load_map,
        store_map,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn child_keys_join_namespace_and_child() {
        assert_eq!(child_key(MESSAGES_NAMESPACE, "abc"), "messages/abc");
    }

    #[test]
    fn key_segments_reject_traversal_and_empty_parts() {
        assert_eq!(key_segments("messages/abc").expect("valid"), vec!["messages", "abc"]);
        assert!(key_segments("").is_err());
        assert!(key_segments("messages//abc").is_err());
        assert!(key_segments("messages/../chats").is_err());
    }

    #[tokio::test]
    async fn empty_map_removes_document() {
        let kv = MemoryKvStore::new();
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u32);
        store_map(&kv, CHATS_KEY, &map).await.expect("store");
        assert!(kv.get(CHATS_KEY).await.expect("get").is_some());

        store_map::<u32>(&kv, CHATS_KEY, &BTreeMap::new())
            .await
            .expect("store empty");
        assert_eq!(kv.get(CHATS_KEY).await.expect("get"), None);

        let loaded: BTreeMap<String, u32> = load_map(&kv, CHATS_KEY).await.expect("load");
        assert!(loaded.is_empty());
    }
}
