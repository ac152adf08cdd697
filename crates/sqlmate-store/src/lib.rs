//! Quota-aware persistence for workbench chats and messages.
//!
//! Chats and messages are stored as JSON documents in a [`KvStore`]. Every
//! write made through [`ChatHistory`] runs inside a [`SaveCoordinator`] that
//! frees space by evicting old chats, or pruning the chat being written,
//! whenever the substrate reports that its capacity is exhausted.

pub mod chats;
pub mod coordinator;
pub mod error;
pub mod eviction;
pub mod hidden;
pub mod history;
pub mod kv;
pub mod messages;
pub mod model;

/// Chat record store.
pub use chats::ChatStore;
/// Quota-aware write coordinator.
pub use coordinator::SaveCoordinator;
/// Storage error types.
pub use error::{KvError, StoreError};
/// Oldest-first eviction strategy.
pub use eviction::EvictionPolicy;
/// Hidden-action side table.
pub use hidden::{HiddenActions, KvHiddenActions};
/// High-level chat history surface.
pub use history::ChatHistory;
/// Key-value substrate trait and reference implementations.
pub use kv::{FileKvStore, KvStore, KvUsage, MemoryKvStore};
/// Message record store and ordering.
pub use messages::{MessageStore, compare_messages};
/// Persisted record models.
pub use model::{Chat, ChatId, Message, MessageId, MessageRole};
