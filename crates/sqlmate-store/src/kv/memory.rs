//! In-process substrate with an optional byte budget.

use super::{KvStore, KvUsage, key_segments};
use crate::error::KvError;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    size: u64,
}

/// In-memory substrate; a write fails once the serialized size of every
/// stored document (keys included) would exceed the capacity.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    capacity_bytes: Option<u64>,
}

impl MemoryKvStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes beyond `capacity_bytes`.
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All stored keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        Ok(self
            .entries
            .lock()
            .get(key)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KvError> {
        key_segments(key)?;
        let size = (serde_json::to_vec(&value)?.len() + key.len()) as u64;
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity_bytes {
            let others: u64 = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(_, entry)| entry.size)
                .sum();
            let previous = entries.get(key).map_or(0, |entry| entry.size);
            let required = others + size;
            if required > capacity && size > previous {
                debug!("memory store rejected write (key={key}, required={required}, capacity={capacity})");
                return Err(KvError::CapacityExceeded {
                    key: key.to_string(),
                    required,
                    capacity,
                });
            }
        }
        entries.insert(key.to_string(), Entry { value, size });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list_children(&self, namespace: &str) -> Result<Vec<String>, KvError> {
        let prefix = format!("{namespace}/");
        Ok(self
            .entries
            .lock()
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|child| !child.contains('/'))
            .map(str::to_string)
            .collect())
    }

    async fn usage(&self) -> Result<KvUsage, KvError> {
        let used_bytes = self.entries.lock().values().map(|entry| entry.size).sum();
        Ok(KvUsage {
            used_bytes,
            capacity_bytes: self.capacity_bytes,
        })
    }
}
