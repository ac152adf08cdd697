//! Public read/write surface used by the workbench UI and the agent pipeline.

use crate::chats::ChatStore;
use crate::coordinator::SaveCoordinator;
use crate::error::StoreError;
use crate::eviction::EvictionPolicy;
use crate::hidden::KvHiddenActions;
use crate::kv::{KvStore, KvUsage};
use crate::messages::MessageStore;
use crate::model::{Chat, ChatId, Message, MessageId};
use log::debug;
use sqlmate_config::EvictionConfig;
use std::sync::Arc;

/// Chat history backed by a key-value substrate.
///
/// Every write that adds data runs through the [`SaveCoordinator`] with the
/// target chat protected; deletes and reads go straight to the stores.
pub struct ChatHistory {
    kv: Arc<dyn KvStore>,
    chats: ChatStore,
    messages: MessageStore,
    hidden: KvHiddenActions,
    coordinator: SaveCoordinator,
}

impl ChatHistory {
    /// Create a history with default eviction limits.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_limits(kv, EvictionConfig::default())
    }

    /// Create a history with explicit eviction limits.
    pub fn with_limits(kv: Arc<dyn KvStore>, limits: EvictionConfig) -> Self {
        let messages = MessageStore::new(kv.clone());
        let hidden = KvHiddenActions::new(kv.clone());
        let chats = ChatStore::new(kv.clone(), messages.clone(), Arc::new(hidden.clone()));
        let policy = EvictionPolicy::new(chats.clone(), messages.clone());
        Self {
            kv,
            chats,
            messages,
            hidden,
            coordinator: SaveCoordinator::new(policy, limits),
        }
    }

    /// Underlying chat store.
    pub fn chats(&self) -> &ChatStore {
        &self.chats
    }

    /// Underlying message store.
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Underlying hidden-action table.
    pub fn hidden_actions(&self) -> &KvHiddenActions {
        &self.hidden
    }

    /// Eviction limits applied to coordinated writes.
    pub fn limits(&self) -> EvictionConfig {
        self.coordinator.limits()
    }

    /// Substrate space usage.
    pub async fn usage(&self) -> Result<KvUsage, StoreError> {
        Ok(self.kv.usage().await?)
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        self.chats.get(chat_id).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        self.chats.list().await
    }

    pub async fn list_chats_for_connection(
        &self,
        connection_id: &str,
    ) -> Result<Vec<Chat>, StoreError> {
        self.chats.list_for_connection(connection_id).await
    }

    pub async fn latest_chat_id(&self) -> Result<Option<ChatId>, StoreError> {
        self.chats.latest_id().await
    }

    /// Upsert a chat, freeing space if needed.
    pub async fn save_chat(&self, chat: &Chat) -> Result<Chat, StoreError> {
        let chats = &self.chats;
        self.coordinator
            .run(Some(chat.id.as_str()), move || chats.save(chat))
            .await
    }

    /// Rename a chat; a missing chat is left absent.
    pub async fn update_chat_title(&self, chat_id: &str, title: &str) -> Result<bool, StoreError> {
        let chats = &self.chats;
        self.coordinator
            .run(Some(chat_id), move || chats.update_title(chat_id, title))
            .await
    }

    /// Delete a chat with its messages and hidden-action markers.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<bool, StoreError> {
        self.chats.delete(chat_id).await
    }

    /// Ordered messages of a chat.
    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        self.messages.list(chat_id).await
    }

    /// Save one message and bump its chat, creating the chat if needed.
    pub async fn save_message(&self, chat_id: &str, message: &Message) -> Result<Message, StoreError> {
        let (chats, messages) = (&self.chats, &self.messages);
        self.coordinator
            .run(Some(chat_id), move || async move {
                let stored = messages.save(chat_id, message).await?;
                chats.touch(chat_id).await?;
                Ok(stored)
            })
            .await
    }

    /// Save several messages with one write and bump their chat.
    pub async fn save_messages(
        &self,
        chat_id: &str,
        batch: &[Message],
    ) -> Result<Vec<Message>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let (chats, messages) = (&self.chats, &self.messages);
        self.coordinator
            .run(Some(chat_id), move || async move {
                let stored = messages.save_batch(chat_id, batch).await?;
                chats.touch(chat_id).await?;
                Ok(stored)
            })
            .await
    }

    /// Delete one message wherever it is stored.
    pub async fn delete_message(&self, message_id: &str) -> Result<bool, StoreError> {
        self.messages.delete(message_id).await
    }

    /// Remove every message of a chat, keeping the chat itself.
    pub async fn clear_messages(&self, chat_id: &str) -> Result<(), StoreError> {
        self.messages.clear(chat_id).await
    }

    /// Manually drop a chat's `count` oldest messages; returns how many went.
    pub async fn prune_messages(&self, chat_id: &str, count: usize) -> Result<usize, StoreError> {
        let _gate = self.coordinator.hold().await;
        self.coordinator
            .policy()
            .prune_oldest_messages(chat_id, count)
            .await
    }

    /// Hide a message's action in the side table.
    pub async fn hide_action(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError> {
        let hidden = &self.hidden;
        debug!("hiding action (chat_id={chat_id}, message_id={message_id})");
        self.coordinator
            .run(Some(chat_id), move || hidden.hide(chat_id, message_id))
            .await
    }

    /// Whether a message's action is hidden.
    pub async fn is_action_hidden(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        self.hidden.is_hidden(chat_id, message_id).await
    }

    /// Hidden message ids of a chat.
    pub async fn hidden_actions_for_chat(&self, chat_id: &str) -> Result<Vec<MessageId>, StoreError> {
        self.hidden.list_for_chat(chat_id).await
    }
}
