//! Persisted chat and message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque chat identifier.
pub type ChatId = String;
/// Time-sortable message identifier.
pub type MessageId = String;

/// Schema version stamped on every message this engine writes.
pub const MESSAGE_SCHEMA_VERSION: u32 = 1;
/// Title given to chats created implicitly by a message write.
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

/// Generate a new record id; UUIDv7 strings sort lexically by creation time.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// One conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat identifier.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Data source the chat is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Creation timestamp; never changes once stored.
    pub created_at: DateTime<Utc>,
    /// Last chat edit or message write.
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Create a chat with a freshly generated id.
    pub fn new(title: impl Into<String>, connection_id: Option<String>) -> Self {
        Self::with_id(new_record_id(), title, connection_id)
    }

    /// Create a chat with a caller-provided id.
    pub fn with_id(
        id: impl Into<ChatId>,
        title: impl Into<String>,
        connection_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            connection_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Owning chat.
    pub chat_id: ChatId,
    /// Author role.
    pub role: MessageRole,
    /// Message body; opaque to the store.
    #[serde(default)]
    pub content: Value,
    /// Position within the chat, assigned on write. Absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
    /// Record schema version. Absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

impl Message {
    /// Create an unsequenced message with a fresh id.
    pub fn new(chat_id: impl Into<ChatId>, role: MessageRole, content: impl Into<Value>) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            sequence: None,
            created_at: now,
            updated_at: now,
            schema_version: None,
        }
    }

    /// Create a message holding a single text part.
    pub fn text(chat_id: impl Into<ChatId>, role: MessageRole, text: &str) -> Self {
        Self::new(
            chat_id,
            role,
            serde_json::json!([{ "type": "text", "text": text }]),
        )
    }

    /// The sequence if one has been validly assigned; zero is never valid.
    pub fn assigned_sequence(&self) -> Option<u64> {
        self.sequence.filter(|sequence| *sequence > 0)
    }
}
