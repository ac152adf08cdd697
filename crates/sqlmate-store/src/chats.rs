//! Chat record store over the `chats` document.

use crate::error::StoreError;
use crate::hidden::HiddenActions;
use crate::kv::{CHATS_KEY, KvStore, load_map, store_map};
use crate::messages::MessageStore;
use crate::model::{Chat, ChatId, DEFAULT_CHAT_TITLE};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Next `updated_at`, never earlier than the stored one.
fn bump(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    previous.map_or(now, |previous| previous.max(now))
}

/// Most recently updated first; ties broken by id for a stable listing.
fn sort_newest_first(chats: &mut [Chat]) {
    chats.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// CRUD and listing over chats; deletion cascades to messages and
/// hidden-action markers.
#[derive(Clone)]
pub struct ChatStore {
    kv: Arc<dyn KvStore>,
    messages: MessageStore,
    hidden: Arc<dyn HiddenActions>,
}

impl ChatStore {
    /// Create a store; `messages` and `hidden` receive cascade deletes.
    pub fn new(kv: Arc<dyn KvStore>, messages: MessageStore, hidden: Arc<dyn HiddenActions>) -> Self {
        Self {
            kv,
            messages,
            hidden,
        }
    }

    async fn load_all(&self) -> Result<BTreeMap<ChatId, Chat>, StoreError> {
        load_map(self.kv.as_ref(), CHATS_KEY).await
    }

    async fn persist(&self, chats: &BTreeMap<ChatId, Chat>) -> Result<(), StoreError> {
        store_map(self.kv.as_ref(), CHATS_KEY, chats).await
    }

    /// Fetch one chat.
    pub async fn get(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.load_all().await?.remove(chat_id))
    }

    /// Upsert a chat and return the stored record.
    ///
    /// The stored `created_at` wins over the caller's for existing chats.
    pub async fn save(&self, chat: &Chat) -> Result<Chat, StoreError> {
        let mut chats = self.load_all().await?;
        let existing = chats.get(&chat.id);
        let stored = Chat {
            created_at: existing.map_or(chat.created_at, |existing| existing.created_at),
            updated_at: bump(existing.map(|existing| existing.updated_at)),
            ..chat.clone()
        };
        debug!("saving chat (chat_id={}, title={})", stored.id, stored.title);
        chats.insert(stored.id.clone(), stored.clone());
        self.persist(&chats).await?;
        Ok(stored)
    }

    /// Rename a chat; returns false, writing nothing, when the chat is absent.
    pub async fn update_title(&self, chat_id: &str, title: &str) -> Result<bool, StoreError> {
        let mut chats = self.load_all().await?;
        let Some(chat) = chats.get_mut(chat_id) else {
            debug!("title update skipped for missing chat (chat_id={chat_id})");
            return Ok(false);
        };
        chat.title = title.to_string();
        chat.updated_at = bump(Some(chat.updated_at));
        self.persist(&chats).await?;
        Ok(true)
    }

    /// Bump a chat's `updated_at`, creating it if a message arrives first.
    pub async fn touch(&self, chat_id: &str) -> Result<Chat, StoreError> {
        let mut chats = self.load_all().await?;
        let chat = chats.entry(chat_id.to_string()).or_insert_with(|| {
            info!("creating chat implicitly (chat_id={chat_id})");
            Chat::with_id(chat_id, DEFAULT_CHAT_TITLE, None)
        });
        chat.updated_at = bump(Some(chat.updated_at));
        let touched = chat.clone();
        self.persist(&chats).await?;
        Ok(touched)
    }

    /// Delete a chat with its messages and hidden-action markers.
    ///
    /// Children are removed even when the chat record is already gone.
    pub async fn delete(&self, chat_id: &str) -> Result<bool, StoreError> {
        self.messages.clear(chat_id).await?;
        self.hidden.clear_for_chat(chat_id).await?;
        let mut chats = self.load_all().await?;
        let existed = chats.remove(chat_id).is_some();
        if existed {
            self.persist(&chats).await?;
        }
        info!("deleted chat (chat_id={chat_id}, existed={existed})");
        Ok(existed)
    }

    /// Every chat, most recently updated first.
    pub async fn list(&self) -> Result<Vec<Chat>, StoreError> {
        let mut chats: Vec<Chat> = self.load_all().await?.into_values().collect();
        sort_newest_first(&mut chats);
        Ok(chats)
    }

    /// Chats scoped to one connection, most recently updated first.
    pub async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<Chat>, StoreError> {
        let mut chats: Vec<Chat> = self
            .load_all()
            .await?
            .into_values()
            .filter(|chat| chat.connection_id.as_deref() == Some(connection_id))
            .collect();
        sort_newest_first(&mut chats);
        Ok(chats)
    }

    /// Id of the most recently updated chat.
    pub async fn latest_id(&self) -> Result<Option<ChatId>, StoreError> {
        Ok(self.list().await?.into_iter().next().map(|chat| chat.id))
    }
}

#[cfg(test)]
mod tests {
    use super::ChatStore;
    use crate::hidden::KvHiddenActions;
    use crate::kv::{KvStore, MemoryKvStore};
    use crate::messages::MessageStore;
    use crate::model::{Chat, DEFAULT_CHAT_TITLE};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> (Arc<MemoryKvStore>, ChatStore) {
        let kv = Arc::new(MemoryKvStore::new());
        let chats = ChatStore::new(
            kv.clone(),
            MessageStore::new(kv.clone()),
            Arc::new(KvHiddenActions::new(kv.clone())),
        );
        (kv, chats)
    }

    #[tokio::test]
    async fn save_preserves_creation_and_never_moves_updated_backwards() {
        let (kv, chats) = store();
        let future = Utc::now() + Duration::hours(1);
        let created = Utc::now() - Duration::days(2);
        kv.set(
            "chats",
            json!({ "c1": {
                "id": "c1",
                "title": "Orders",
                "createdAt": created,
                "updatedAt": future
            }}),
        )
        .await
        .expect("seed");

        let stored = chats
            .save(&Chat::with_id("c1", "Orders by region", None))
            .await
            .expect("save");
        assert_eq!(stored.created_at, created);
        assert_eq!(stored.updated_at, future);
        assert_eq!(stored.title, "Orders by region");
    }

    #[tokio::test]
    async fn update_title_on_missing_chat_is_a_no_op() {
        let (kv, chats) = store();
        assert!(!chats.update_title("ghost", "Hello").await.expect("update"));
        assert_eq!(chats.get("ghost").await.expect("get"), None);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn listing_orders_and_filters() {
        let (_, chats) = store();
        chats
            .save(&Chat::with_id("a", "A", Some("pg".to_string())))
            .await
            .expect("save");
        chats
            .save(&Chat::with_id("b", "B", Some("mysql".to_string())))
            .await
            .expect("save");
        chats
            .save(&Chat::with_id("c", "C", Some("pg".to_string())))
            .await
            .expect("save");
        chats.update_title("a", "A2").await.expect("rename");

        let ids: Vec<_> = chats
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|chat| chat.id)
            .collect();
        assert_eq!(ids[0], "a");
        assert_eq!(chats.latest_id().await.expect("latest"), Some("a".to_string()));

        let pg: Vec<_> = chats
            .list_for_connection("pg")
            .await
            .expect("list")
            .into_iter()
            .map(|chat| chat.id)
            .collect();
        assert_eq!(pg.len(), 2);
        assert!(pg.iter().all(|id| id == "a" || id == "c"));
    }

    #[tokio::test]
    async fn touch_creates_missing_chat() {
        let (_, chats) = store();
        let chat = chats.touch("fresh").await.expect("touch");
        assert_eq!(chat.title, DEFAULT_CHAT_TITLE);
        assert_eq!(chat.connection_id, None);
        assert_eq!(chats.get("fresh").await.expect("get"), Some(chat));
    }

    #[tokio::test]
    async fn empty_store_reads_as_defaults() {
        let (_, chats) = store();
        assert!(chats.list().await.expect("list").is_empty());
        assert_eq!(chats.latest_id().await.expect("latest"), None);
        assert!(!chats.delete("missing").await.expect("delete"));
    }
}
