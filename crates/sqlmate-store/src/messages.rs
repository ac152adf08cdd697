//! Message record store: sequencing, ordering and migration-on-read.

use crate::error::StoreError;
use crate::kv::{KvStore, MESSAGES_NAMESPACE, child_key, load_map, store_map};
use crate::model::{ChatId, MESSAGE_SCHEMA_VERSION, Message, MessageId};
use chrono::Utc;
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Total order over messages of one chat.
///
/// Sequenced pairs compare by sequence; otherwise, and on ties, by
/// `created_at` and then `id`.
///
/// Only a total order when every message in the set is sequenced or none
/// is. Mixed sets are not transitive; `list` renumbers them before sorting.
pub fn compare_messages(a: &Message, b: &Message) -> Ordering {
    let by_sequence = match (a.assigned_sequence(), b.assigned_sequence()) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => Ordering::Equal,
    };
    by_sequence.then_with(|| compare_by_creation(a, b))
}

/// Order ignoring sequences; used to renumber legacy chats.
fn compare_by_creation(a: &Message, b: &Message) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Highest valid sequence in a chat document, or zero.
fn max_sequence(records: &BTreeMap<MessageId, Message>) -> u64 {
    records
        .values()
        .filter_map(Message::assigned_sequence)
        .max()
        .unwrap_or(0)
}

/// CRUD over `messages/<chat_id>` documents.
#[derive(Clone)]
pub struct MessageStore {
    kv: Arc<dyn KvStore>,
}

impl MessageStore {
    /// Create a store over the given substrate.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(chat_id: &str) -> String {
        child_key(MESSAGES_NAMESPACE, chat_id)
    }

    /// Load the raw message document of a chat.
    async fn load(&self, chat_id: &str) -> Result<BTreeMap<MessageId, Message>, StoreError> {
        let records: BTreeMap<MessageId, Message> =
            load_map(self.kv.as_ref(), &Self::key(chat_id)).await?;
        if let Some(version) = records
            .values()
            .filter_map(|message| message.schema_version)
            .find(|version| *version > MESSAGE_SCHEMA_VERSION)
        {
            return Err(StoreError::UnsupportedSchema(version));
        }
        Ok(records)
    }

    async fn persist(
        &self,
        chat_id: &str,
        records: &BTreeMap<MessageId, Message>,
    ) -> Result<(), StoreError> {
        store_map(self.kv.as_ref(), &Self::key(chat_id), records).await
    }

    /// List a chat's messages in order, repairing legacy records first.
    pub async fn list(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        let records = self.load(chat_id).await?;
        let mut messages: Vec<Message> = records.into_values().collect();
        if messages
            .iter()
            .any(|message| message.assigned_sequence().is_none())
        {
            return self.migrate(chat_id, messages).await;
        }
        messages.sort_by(compare_messages);
        Ok(messages)
    }

    /// Renumber every message by creation order and write the set back.
    ///
    /// A capacity failure on the write-back still returns the repaired list;
    /// the repair is attempted again on the next read.
    async fn migrate(
        &self,
        chat_id: &str,
        mut messages: Vec<Message>,
    ) -> Result<Vec<Message>, StoreError> {
        messages.sort_by(compare_by_creation);
        for (position, message) in messages.iter_mut().enumerate() {
            message.sequence = Some(position as u64 + 1);
            message.schema_version = Some(MESSAGE_SCHEMA_VERSION);
        }
        let records: BTreeMap<MessageId, Message> = messages
            .iter()
            .map(|message| (message.id.clone(), message.clone()))
            .collect();
        match self.persist(chat_id, &records).await {
            Ok(()) => info!(
                "migrated legacy messages (chat_id={}, count={})",
                chat_id,
                messages.len()
            ),
            Err(err) if err.is_capacity_exceeded() => warn!(
                "legacy message migration not persisted (chat_id={chat_id}): {err}"
            ),
            Err(err) => return Err(err),
        }
        Ok(messages)
    }

    /// Insert or update one message and return the stored record.
    ///
    /// Re-saving an existing id keeps its sequence and creation time.
    pub async fn save(&self, chat_id: &str, message: &Message) -> Result<Message, StoreError> {
        let mut records = self.load(chat_id).await?;
        let mut next = max_sequence(&records);
        let stored = stamp(chat_id, message, records.get(&message.id), &mut next);
        debug!(
            "saving message (chat_id={}, id={}, sequence={:?})",
            chat_id, stored.id, stored.sequence
        );
        records.insert(stored.id.clone(), stored.clone());
        self.persist(chat_id, &records).await?;
        Ok(stored)
    }

    /// Insert or update several messages with a single write.
    ///
    /// New messages receive consecutive sequences after the chat's current
    /// maximum, in call order.
    pub async fn save_batch(
        &self,
        chat_id: &str,
        messages: &[Message],
    ) -> Result<Vec<Message>, StoreError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = self.load(chat_id).await?;
        let mut next = max_sequence(&records);
        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            let record = stamp(chat_id, message, records.get(&message.id), &mut next);
            records.insert(record.id.clone(), record.clone());
            stored.push(record);
        }
        debug!(
            "saving message batch (chat_id={}, count={}, max_sequence={})",
            chat_id,
            stored.len(),
            next
        );
        self.persist(chat_id, &records).await?;
        Ok(stored)
    }

    /// Delete a message from whichever chat holds it.
    pub async fn delete(&self, message_id: &str) -> Result<bool, StoreError> {
        for chat_id in self.kv.list_children(MESSAGES_NAMESPACE).await? {
            if self.delete_in_chat(&chat_id, message_id).await? {
                return Ok(true);
            }
        }
        debug!("message not found for delete (id={message_id})");
        Ok(false)
    }

    /// Delete a message from a known chat.
    pub async fn delete_in_chat(&self, chat_id: &str, message_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .remove_many(chat_id, &[message_id.to_string()])
            .await?;
        Ok(removed > 0)
    }

    /// Remove the given ids from a chat with one write; returns how many existed.
    pub async fn remove_many(
        &self,
        chat_id: &str,
        message_ids: &[MessageId],
    ) -> Result<usize, StoreError> {
        let mut records = self.load(chat_id).await?;
        let before = records.len();
        for id in message_ids {
            records.remove(id);
        }
        let removed = before - records.len();
        if removed > 0 {
            self.persist(chat_id, &records).await?;
        }
        Ok(removed)
    }

    /// Remove every message of a chat.
    pub async fn clear(&self, chat_id: &str) -> Result<(), StoreError> {
        debug!("clearing messages (chat_id={chat_id})");
        self.kv.remove(&Self::key(chat_id)).await?;
        Ok(())
    }

    /// Number of messages stored for a chat.
    pub async fn count(&self, chat_id: &str) -> Result<usize, StoreError> {
        Ok(self.load(chat_id).await?.len())
    }

    /// Chats that currently have a message document.
    pub async fn chat_ids(&self) -> Result<Vec<ChatId>, StoreError> {
        Ok(self.kv.list_children(MESSAGES_NAMESPACE).await?)
    }
}

/// Build the record to store for `message`, reusing the existing sequence or
/// taking the next one.
fn stamp(chat_id: &str, message: &Message, existing: Option<&Message>, next: &mut u64) -> Message {
    let sequence = match existing.and_then(Message::assigned_sequence) {
        Some(sequence) => sequence,
        None => {
            *next += 1;
            *next
        }
    };
    Message {
        chat_id: chat_id.to_string(),
        sequence: Some(sequence),
        created_at: existing.map_or(message.created_at, |existing| existing.created_at),
        updated_at: Utc::now(),
        schema_version: Some(MESSAGE_SCHEMA_VERSION),
        ..message.clone()
    }
}
