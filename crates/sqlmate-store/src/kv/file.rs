//! File-backed substrate storing one JSON document per key.

use super::{KvStore, KvUsage, key_segments};
use crate::error::KvError;
use async_trait::async_trait;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PLAIN_SUFFIX: &str = ".json";
const COMPRESSED_SUFFIX: &str = ".json.z";
const TEMP_SUFFIX: &str = ".tmp";

/// Substrate mapping `a/b` keys to `<root>/a/b.json` files.
///
/// Documents are optionally zlib-compressed (`.json.z`); reads accept either
/// form so the setting can change between runs. The byte budget counts the
/// on-disk size of every document under the root.
#[derive(Debug)]
pub struct FileKvStore {
    root: PathBuf,
    capacity_bytes: Option<u64>,
    compress: bool,
    /// Serializes writers and tracks the bytes currently on disk.
    used_bytes: Mutex<u64>,
}

impl FileKvStore {
    /// Open an unbounded, uncompressed store under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, KvError> {
        Self::open_with(root, None, false)
    }

    /// Open a store with an optional byte budget and compression.
    pub fn open_with(
        root: impl AsRef<Path>,
        capacity_bytes: Option<u64>,
        compress: bool,
    ) -> Result<Self, KvError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let used = scan_usage(&root)?;
        info!(
            "initialized file kv store (root={}, used_bytes={}, capacity_bytes={:?}, compress={})",
            root.display(),
            used,
            capacity_bytes,
            compress
        );
        Ok(Self {
            root,
            capacity_bytes,
            compress,
            used_bytes: Mutex::new(used),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `key` in the requested encoding.
    fn document_path(&self, key: &str, compressed: bool) -> Result<PathBuf, KvError> {
        let segments = key_segments(key)?;
        let mut path = self.root.clone();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| KvError::InvalidKey(key.to_string()))?;
        for segment in parents {
            path.push(segment);
        }
        let suffix = if compressed {
            COMPRESSED_SUFFIX
        } else {
            PLAIN_SUFFIX
        };
        path.push(format!("{last}{suffix}"));
        Ok(path)
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, KvError> {
        let bytes = serde_json::to_vec(value)?;
        if !self.compress {
            return Ok(bytes);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        Ok(encoder.finish()?)
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        for compressed in [true, false] {
            let path = self.document_path(key, compressed)?;
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(KvError::Io(err)),
            };
            let value = if compressed {
                let mut decoded = Vec::new();
                ZlibDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
                serde_json::from_slice(&decoded)?
            } else {
                serde_json::from_slice(&bytes)?
            };
            return Ok(Some(value));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KvError> {
        let bytes = self.encode(&value)?;
        let path = self.document_path(key, self.compress)?;
        let stale_path = self.document_path(key, !self.compress)?;

        let mut used = self.used_bytes.lock();
        let previous = file_len(&path) + file_len(&stale_path);
        let size = bytes.len() as u64;
        if let Some(capacity) = self.capacity_bytes {
            let required = used.saturating_sub(previous) + size;
            if required > capacity && size > previous {
                debug!(
                    "file store rejected write (key={key}, required={required}, capacity={capacity})"
                );
                return Err(KvError::CapacityExceeded {
                    key: key.to_string(),
                    required,
                    capacity,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut temp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| KvError::InvalidKey(key.to_string()))?;
        temp_name.push(TEMP_SUFFIX);
        let temp_path = path.with_file_name(temp_name);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
        }
        fs::rename(&temp_path, &path)?;
        if stale_path.exists() {
            fs::remove_file(&stale_path)?;
        }
        *used = used.saturating_sub(previous) + size;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut used = self.used_bytes.lock();
        for compressed in [true, false] {
            let path = self.document_path(key, compressed)?;
            let len = file_len(&path);
            match fs::remove_file(&path) {
                Ok(()) => *used = used.saturating_sub(len),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(KvError::Io(err)),
            }
        }
        Ok(())
    }

    async fn list_children(&self, namespace: &str) -> Result<Vec<String>, KvError> {
        let mut dir = self.root.clone();
        for segment in key_segments(namespace)? {
            dir.push(segment);
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(KvError::Io(err)),
        };
        let mut children = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("skipping non-utf8 document name in {}", dir.display());
                continue;
            };
            let child = name
                .strip_suffix(COMPRESSED_SUFFIX)
                .or_else(|| name.strip_suffix(PLAIN_SUFFIX));
            if let Some(child) = child {
                children.insert(child.to_string());
            }
        }
        Ok(children.into_iter().collect())
    }

    async fn usage(&self) -> Result<KvUsage, KvError> {
        Ok(KvUsage {
            used_bytes: *self.used_bytes.lock(),
            capacity_bytes: self.capacity_bytes,
        })
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// Sum the size of every document under the root, ignoring leftover temp files.
fn scan_usage(root: &Path) -> Result<u64, KvError> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| KvError::Backend(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(TEMP_SUFFIX));
        if is_temp {
            continue;
        }
        total += entry
            .metadata()
            .map_err(|err| KvError::Backend(err.to_string()))?
            .len();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::FileKvStore;
    use crate::kv::KvStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn documents_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        {
            let kv = FileKvStore::open(temp.path()).expect("open");
            kv.set("chats", json!({ "a": { "title": "one" } }))
                .await
                .expect("set");
            kv.set("messages/a", json!({ "m1": {} })).await.expect("set");
        }
        let kv = FileKvStore::open(temp.path()).expect("reopen");
        assert_eq!(
            kv.get("chats").await.expect("get"),
            Some(json!({ "a": { "title": "one" } }))
        );
        assert_eq!(
            kv.list_children("messages").await.expect("children"),
            vec!["a".to_string()]
        );
        assert!(kv.usage().await.expect("usage").used_bytes > 0);
    }

    #[tokio::test]
    async fn compressed_documents_are_readable_after_toggle() {
        let temp = tempdir().expect("tempdir");
        let value = json!({ "text": "select * from orders ".repeat(20) });
        {
            let kv = FileKvStore::open_with(temp.path(), None, true).expect("open");
            kv.set("messages/a", value.clone()).await.expect("set");
            assert!(temp.path().join("messages").join("a.json.z").exists());
        }
        let kv = FileKvStore::open_with(temp.path(), None, false).expect("reopen");
        assert_eq!(kv.get("messages/a").await.expect("get"), Some(value.clone()));

        kv.set("messages/a", value).await.expect("rewrite plain");
        assert!(temp.path().join("messages").join("a.json").exists());
        assert!(!temp.path().join("messages").join("a.json.z").exists());
        assert_eq!(
            kv.list_children("messages").await.expect("children"),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn capacity_is_enforced_and_freed_by_remove() {
        let temp = tempdir().expect("tempdir");
        let kv = FileKvStore::open_with(temp.path(), Some(64), false).expect("open");
        kv.set("a", json!("x".repeat(40))).await.expect("fits");

        let err = kv.set("b", json!("y".repeat(40))).await.unwrap_err();
        assert!(err.is_capacity_exceeded());

        kv.remove("a").await.expect("remove");
        assert_eq!(kv.usage().await.expect("usage").used_bytes, 0);
        kv.set("b", json!("y".repeat(40))).await.expect("fits after remove");
    }

    #[tokio::test]
    async fn rejects_keys_escaping_the_root() {
        let temp = tempdir().expect("tempdir");
        let kv = FileKvStore::open(temp.path()).expect("open");
        assert!(kv.set("../outside", json!(1)).await.is_err());
        assert_eq!(kv.get("missing/key").await.expect("get"), None);
    }
}
