//! Error types for the key-value substrate and the record stores.

use thiserror::Error;

/// Errors returned by key-value substrates.
#[derive(Debug, Error)]
pub enum KvError {
    /// The write would exceed the substrate's byte budget.
    #[error(
        "storage capacity exceeded writing {key} (required={required} bytes, capacity={capacity} bytes)"
    )]
    CapacityExceeded {
        key: String,
        required: u64,
        capacity: u64,
    },
    /// Key is empty or contains a path segment the substrate cannot store.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl KvError {
    /// True when the failure is the recoverable "out of space" signal.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, KvError::CapacityExceeded { .. })
    }
}

/// Errors returned by chat and message stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Substrate failure.
    #[error(transparent)]
    Kv(#[from] KvError),
    /// Stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A record was written by a newer schema than this build understands.
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    /// Eviction and pruning freed nothing and the write still does not fit.
    #[error(
        "chat storage is full after {attempts} attempts and nothing more can be freed automatically; delete old chats or clear the workbench storage manually"
    )]
    StorageExhausted { attempts: usize },
}

impl StoreError {
    /// True when the failure should drive eviction and a retry.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, StoreError::Kv(err) if err.is_capacity_exceeded())
    }
}
