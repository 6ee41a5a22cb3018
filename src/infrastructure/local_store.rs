// Local key/value stores for cache entries and config snapshots
use crate::application::cache_store::{CacheStore, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Process-lifetime store, used when no local directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key under a directory. Last writer wins.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt store entry {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", self.dir.display(), e)))?;

        // Write then rename so readers never observe a half-written entry.
        let path = self.path_for(key);
        let tmp = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache"));

        assert!(store.read("charts_page_home").await.is_none());
        store
            .write("charts_page_home", &json!({"payload": [], "timestamp": 1, "expiresIn": 2}))
            .await
            .unwrap();
        assert_eq!(
            store.read("charts_page_home").await,
            Some(json!({"payload": [], "timestamp": 1, "expiresIn": 2}))
        );

        store.remove("charts_page_home").await.unwrap();
        store.remove("charts_page_home").await.unwrap();
        assert!(store.read("charts_page_home").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileStore::new(dir.path()));

        let writes = (0..16).map(|n| {
            let store = store.clone();
            tokio::spawn(async move { store.write("all_charts", &json!([n])).await })
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap().unwrap();
        }

        let value = store.read("all_charts").await.unwrap();
        assert!(value[0].as_u64().is_some_and(|n| n < 16));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_file_store_encodes_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.write("tables_page_../../etc", &json!(1)).await.unwrap();
        assert_eq!(store.read("tables_page_../../etc").await, Some(json!(1)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::write(dir.path().join("all_tables.json"), b"{not json").unwrap();

        assert!(store.read("all_tables").await.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_directory_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = FileStore::new(blocker.join("nested"));

        let err = store.write("k", &json!(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
