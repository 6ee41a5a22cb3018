// Persisted key/value store backing the config cache and local snapshots
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Local storage unavailable: {0}")]
    Unavailable(String),
}

/// A cached payload with its write time and lifetime, both in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Value,
    pub timestamp: i64,
    pub expires_in: i64,
}

impl CacheEntry {
    pub fn new(payload: Value, now_ms: i64, expires_in: i64) -> Self {
        Self {
            payload,
            timestamp: now_ms,
            expires_in,
        }
    }

    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp < self.expires_in
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, key: &str) -> Option<Value>;

    async fn write(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
