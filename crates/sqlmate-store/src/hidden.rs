//! Hidden-action side table: per-chat, per-message "hidden" markers.

use crate::error::StoreError;
use crate::kv::{HIDDEN_ACTIONS_NAMESPACE, KvStore, child_key, load_map, store_map};
use crate::model::MessageId;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
/// The part of the side table that chat deletion depends on.
pub trait HiddenActions: Send + Sync {
    /// Drop every marker recorded for a chat.
    async fn clear_for_chat(&self, chat_id: &str) -> Result<(), StoreError>;
}

/// Side table stored as `hidden-actions/<chat_id>` documents.
#[derive(Clone)]
pub struct KvHiddenActions {
    kv: Arc<dyn KvStore>,
}

impl KvHiddenActions {
    /// Create a table over the given substrate.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(chat_id: &str) -> String {
        child_key(HIDDEN_ACTIONS_NAMESPACE, chat_id)
    }

    async fn load(&self, chat_id: &str) -> Result<BTreeMap<MessageId, bool>, StoreError> {
        load_map(self.kv.as_ref(), &Self::key(chat_id)).await
    }

    /// Mark a message's action as hidden.
    pub async fn hide(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError> {
        let mut markers = self.load(chat_id).await?;
        if markers.insert(message_id.to_string(), true).is_some() {
            return Ok(());
        }
        store_map(self.kv.as_ref(), &Self::key(chat_id), &markers).await
    }

    /// Remove a marker; returns whether one existed.
    pub async fn unhide(&self, chat_id: &str, message_id: &str) -> Result<bool, StoreError> {
        let mut markers = self.load(chat_id).await?;
        if markers.remove(message_id).is_none() {
            return Ok(false);
        }
        store_map(self.kv.as_ref(), &Self::key(chat_id), &markers).await?;
        Ok(true)
    }

    /// Whether a message's action is hidden.
    pub async fn is_hidden(&self, chat_id: &str, message_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .load(chat_id)
            .await?
            .get(message_id)
            .copied()
            .unwrap_or(false))
    }

    /// Ids of every hidden message in a chat.
    pub async fn list_for_chat(&self, chat_id: &str) -> Result<Vec<MessageId>, StoreError> {
        Ok(self
            .load(chat_id)
            .await?
            .into_iter()
            .filter_map(|(id, hidden)| hidden.then_some(id))
            .collect())
    }
}

#[async_trait]
impl HiddenActions for KvHiddenActions {
    async fn clear_for_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        debug!("clearing hidden actions (chat_id={chat_id})");
        self.kv.remove(&Self::key(chat_id)).await?;
        Ok(())
    }
}
