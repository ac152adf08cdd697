use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};
use sqlmate_store::{Chat, KvStore, Message, MessageRole};

/// Timestamp `seconds` after the Unix epoch.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Chat whose timestamps are pinned to `seconds`.
pub fn chat_at(id: &str, seconds: i64) -> Chat {
    let mut chat = Chat::with_id(id, id, None);
    chat.created_at = at(seconds);
    chat.updated_at = at(seconds);
    chat
}

/// Message as written before sequences existed: no sequence, no schema tag.
pub fn legacy_message(chat_id: &str, id: &str, created_seconds: i64) -> Message {
    let mut message = Message::text(chat_id, MessageRole::User, id);
    message.id = id.to_string();
    message.created_at = at(created_seconds);
    message.updated_at = at(created_seconds);
    message.sequence = None;
    message.schema_version = None;
    message
}

/// Write the `chats` document directly, bypassing timestamp bumps.
pub async fn seed_chats(kv: &dyn KvStore, chats: &[Chat]) {
    let mut document = Map::new();
    for chat in chats {
        document.insert(
            chat.id.clone(),
            serde_json::to_value(chat).unwrap_or(Value::Null),
        );
    }
    kv.set("chats", Value::Object(document))
        .await
        .expect("seed chats");
}

/// Write a raw message document for a chat.
pub async fn seed_legacy_messages(kv: &dyn KvStore, chat_id: &str, messages: &[Message]) {
    let mut document = Map::new();
    for message in messages {
        let mut value = serde_json::to_value(message).unwrap_or(Value::Null);
        if let Some(record) = value.as_object_mut() {
            record.remove("sequence");
            record.remove("schemaVersion");
        }
        document.insert(message.id.clone(), value);
    }
    kv.set(&format!("messages/{chat_id}"), Value::Object(document))
        .await
        .expect("seed messages");
}

/// Content part with a payload of roughly `bytes` characters.
pub fn padding(bytes: usize) -> Value {
    json!([{ "type": "text", "text": "x".repeat(bytes) }])
}
