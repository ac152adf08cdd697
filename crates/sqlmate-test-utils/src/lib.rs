//! Test helpers shared across sqlmate crates.

pub mod fixtures;
pub mod kv;

pub use fixtures::{at, chat_at, legacy_message, padding, seed_chats, seed_legacy_messages};
pub use kv::{FailureRule, ScriptedKvStore};
