//! Oldest-first removal of chats and messages to free storage.

use crate::chats::ChatStore;
use crate::error::StoreError;
use crate::messages::MessageStore;
use crate::model::{Chat, MessageId};
use log::{debug, info};

/// Selects and deletes the oldest data when the substrate is full.
#[derive(Clone)]
pub struct EvictionPolicy {
    chats: ChatStore,
    messages: MessageStore,
}

impl EvictionPolicy {
    pub fn new(chats: ChatStore, messages: MessageStore) -> Self {
        Self { chats, messages }
    }

    /// Chats eligible for eviction, least recently updated first.
    async fn candidates(&self, exclude: Option<&str>) -> Result<Vec<Chat>, StoreError> {
        let mut chats: Vec<Chat> = self
            .chats
            .list()
            .await?
            .into_iter()
            .filter(|chat| Some(chat.id.as_str()) != exclude)
            .collect();
        chats.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(chats)
    }

    /// Number of chats that could be evicted while protecting `exclude`.
    pub async fn evictable_chat_count(&self, exclude: Option<&str>) -> Result<usize, StoreError> {
        Ok(self.candidates(exclude).await?.len())
    }

    /// Messages the protected chat could still give up.
    pub async fn prunable_message_count(&self, chat_id: &str) -> Result<usize, StoreError> {
        self.messages.count(chat_id).await
    }

    /// Cascade-delete up to `limit` of the least recently updated chats,
    /// never touching `exclude`. Returns how many were removed.
    pub async fn evict_oldest_chats(
        &self,
        limit: usize,
        exclude: Option<&str>,
    ) -> Result<usize, StoreError> {
        let mut evicted = 0;
        for chat in self.candidates(exclude).await?.into_iter().take(limit) {
            debug!(
                "evicting chat (chat_id={}, updated_at={})",
                chat.id, chat.updated_at
            );
            self.chats.delete(&chat.id).await?;
            evicted += 1;
        }
        if evicted > 0 {
            info!("evicted oldest chats (count={evicted}, protected={exclude:?})");
        }
        Ok(evicted)
    }

    /// Delete up to `limit` of a chat's earliest messages with one write.
    /// Returns how many were removed.
    pub async fn prune_oldest_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<usize, StoreError> {
        let oldest: Vec<MessageId> = self
            .messages
            .list(chat_id)
            .await?
            .into_iter()
            .take(limit)
            .map(|message| message.id)
            .collect();
        if oldest.is_empty() {
            return Ok(0);
        }
        let removed = self.messages.remove_many(chat_id, &oldest).await?;
        info!("pruned oldest messages (chat_id={chat_id}, count={removed})");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::EvictionPolicy;
    use crate::chats::ChatStore;
    use crate::hidden::KvHiddenActions;
    use crate::kv::{KvStore, MemoryKvStore};
    use crate::messages::MessageStore;
    use crate::model::{Chat, Message, MessageRole};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn policy() -> (Arc<MemoryKvStore>, ChatStore, MessageStore, EvictionPolicy) {
        let kv = Arc::new(MemoryKvStore::new());
        let messages = MessageStore::new(kv.clone());
        let chats = ChatStore::new(
            kv.clone(),
            messages.clone(),
            Arc::new(KvHiddenActions::new(kv.clone())),
        );
        let policy = EvictionPolicy::new(chats.clone(), messages.clone());
        (kv, chats, messages, policy)
    }

    #[tokio::test]
    async fn evicts_least_recent_chats_and_skips_protected() {
        let (kv, chats, _, policy) = policy();
        let mut seeded = serde_json::Map::new();
        for (id, seconds) in [("new", 40), ("protected", 5), ("old", 10), ("middle", 20)] {
            let mut chat = Chat::with_id(id, id, None);
            chat.updated_at = Utc.timestamp_opt(seconds, 0).single().expect("time");
            seeded.insert(id.to_string(), serde_json::to_value(&chat).expect("encode"));
        }
        kv.set("chats", serde_json::Value::Object(seeded))
            .await
            .expect("seed");

        assert_eq!(
            policy
                .evictable_chat_count(Some("protected"))
                .await
                .expect("count"),
            3
        );
        let evicted = policy
            .evict_oldest_chats(2, Some("protected"))
            .await
            .expect("evict");
        assert_eq!(evicted, 2);

        let remaining: Vec<_> = chats
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|chat| chat.id)
            .collect();
        assert!(remaining.contains(&"protected".to_string()));
        assert!(remaining.contains(&"new".to_string()));
        assert_eq!(remaining.len(), 2);

        assert_eq!(
            policy
                .evict_oldest_chats(5, Some("protected"))
                .await
                .expect("evict"),
            1
        );
        assert_eq!(
            policy
                .evict_oldest_chats(5, Some("protected"))
                .await
                .expect("evict"),
            0
        );
    }

    #[tokio::test]
    async fn prunes_lowest_sequences_first() {
        let (_, _, messages, policy) = policy();
        let batch: Vec<Message> = (0..5)
            .map(|index| Message::text("chat", MessageRole::User, &format!("q{index}")))
            .collect();
        messages.save_batch("chat", &batch).await.expect("batch");
        assert_eq!(
            policy.prunable_message_count("chat").await.expect("count"),
            5
        );

        assert_eq!(
            policy.prune_oldest_messages("chat", 3).await.expect("prune"),
            3
        );
        let left: Vec<_> = messages
            .list("chat")
            .await
            .expect("list")
            .into_iter()
            .map(|message| message.sequence)
            .collect();
        assert_eq!(left, vec![Some(4), Some(5)]);

        assert_eq!(
            policy.prune_oldest_messages("chat", 3).await.expect("prune"),
            2
        );
        assert_eq!(
            policy.prune_oldest_messages("chat", 3).await.expect("prune"),
            0
        );
    }
}
