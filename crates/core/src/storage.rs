//! Persistent key-value storage boundary
//!
//! The request layer keeps its response cache and offline queues in a
//! string-keyed, string-valued store. Platform adapters implement
//! [`KeyValueStore`]; two adapters ship here:
//!
//! - [`MemoryStore`]: process-local map, used in tests and ephemeral sessions
//! - [`FileStore`]: one JSON document per key under a directory, written
//!   atomically through a temp file
//!
//! Keys are partitioned by prefix (`cache_<key>`, `offline_queue_<service>`),
//! so independent services never collide.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Async key-value store used for cache and queue durability.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Check whether a key holds a value
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// List every stored key
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete every stored key
    async fn clear(&self) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// On-disk record: the original key travels with the value so `keys()` can
/// be answered from hashed file names.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    value: String,
}

/// File-backed store, one `<sha256(key)>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            Error::from(e).with_context(format!("Creating store directory {}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    /// Open the store in the platform data directory
    pub async fn open_default() -> Result<Self> {
        Self::open(default_dir()).await
    }

    /// Directory backing this store
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    async fn read_record(path: &Path, key: &str) -> Result<Option<StoredRecord>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage_read(key, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| Error::storage_corrupted(key).with_source(e))
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Default store directory (`<data dir>/caltracker/store`)
#[must_use]
pub fn default_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".data"))
        .join("caltracker")
        .join("store")
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let record = Self::read_record(&path, key).await?;
        Ok(record.map(|r| r.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let record = StoredRecord {
            key: key.to_string(),
            value: value.to_string(),
        };
        let json = serde_json::to_vec(&record)?;

        // One temp file per write; concurrent writers of a key race only on the rename
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::storage_write(key, e));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_write(key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.json_files().await? {
            match Self::read_record(&path, &path.display().to_string()).await {
                Ok(Some(record)) => keys.push(record.key),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable store file");
                }
            }
        }
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        for path in self.json_files().await? {
            let _ = fs::remove_file(&path).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(!store.exists("missing").await.unwrap());

        store.set("cache_a", "1").await.unwrap();
        store.set("offline_queue_food", "[]").await.unwrap();
        store.set("cache_a", "2").await.unwrap();

        assert_eq!(store.get("cache_a").await.unwrap().as_deref(), Some("2"));
        assert!(store.exists("offline_queue_food").await.unwrap());

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache_a", "offline_queue_food"]);

        store.remove("cache_a").await.unwrap();
        store.remove("cache_a").await.unwrap();
        assert_eq!(store.get("cache_a").await.unwrap(), None);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        exercise(&store).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_store_contract() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        let first = FileStore::open(temp_dir.path()).await.unwrap();
        first.set("last_sync_timestamp", "42").await.unwrap();
        drop(first);

        let second = FileStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            second.get("last_sync_timestamp").await.unwrap().as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).await.unwrap();

        std::fs::write(store.path_for("cache_x"), "not json").unwrap();

        let err = store.get("cache_x").await.unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::StorageCorrupted);
        assert!(err.to_string().contains("cache_x"));
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_writes_to_one_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(temp_dir.path()).await.unwrap());

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .set("cache_food_search_egg", &format!("[{i}]"))
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = store.get("cache_food_search_egg").await.unwrap().unwrap();
        let index: Vec<u32> = serde_json::from_str(&stored).unwrap();
        assert!(index[0] < 64);
        assert_eq!(store.keys().await.unwrap(), vec!["cache_food_search_egg"]);

        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .is_ok_and(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
