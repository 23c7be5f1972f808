use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::config::{Settings, StoreBackendKind};
use crate::core::redis::RedisHandle;
use crate::repositories::redis_kv::RedisKv;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Minimal string key-value storage the local stores are written against.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Hex doubles the length and most filesystems cap a name at 255 bytes.
const MAX_FILE_KEY_BYTES: usize = 120;

/// One file per key under `root`. Writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are hex-encoded into file names, so any key maps to exactly one file
    /// directly under `root`.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.len() > MAX_FILE_KEY_BYTES {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.json", hex::encode(key.as_bytes()))))
    }
}

#[async_trait]
impl KvBackend for FileKv {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Builds the configured backend. A redis backend that cannot connect keeps running
/// disconnected, which makes the stores behave as empty caches.
pub async fn backend_from_settings(settings: &Settings) -> Arc<dyn KvBackend> {
    match settings.store().backend {
        StoreBackendKind::Memory => Arc::new(MemoryKv::new()),
        StoreBackendKind::File => Arc::new(FileKv::new(settings.store().dir.clone())),
        StoreBackendKind::Redis => {
            let redis = RedisHandle::new(settings.redis().redis_url());
            if let Err(err) = redis.connect().await {
                tracing::error!(
                    error = %err,
                    "Failed to connect to Redis; progress store disabled"
                );
            } else {
                tracing::info!("Redis connected successfully");
            }
            Arc::new(RedisKv::new(redis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_set_get_remove() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1".to_string()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        kv.remove("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_kv_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = FileKv::new(dir.path().join("progress"));
        kv.set("exam_progress:e-1", "{\"x\":1}".to_string()).await.unwrap();

        let reopened = FileKv::new(dir.path().join("progress"));
        assert_eq!(reopened.get("exam_progress:e-1").await.unwrap().as_deref(), Some("{\"x\":1}"));

        reopened.remove("exam_progress:e-1").await.unwrap();
        reopened.remove("exam_progress:e-1").await.unwrap();
        assert_eq!(kv.get("exam_progress:e-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_kv_accepts_any_key_without_collisions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = FileKv::new(dir.path().join("progress"));

        kv.set("exam_progress:a:b", "colon".to_string()).await.unwrap();
        kv.set("exam_progress:a__b", "underscore".to_string()).await.unwrap();
        kv.set("exam_progress:../etc/passwd", "slash".to_string()).await.unwrap();
        kv.set("exam_progress:Физика 2025", "unicode".to_string()).await.unwrap();

        for (key, expected) in [
            ("exam_progress:a:b", "colon"),
            ("exam_progress:a__b", "underscore"),
            ("exam_progress:../etc/passwd", "slash"),
            ("exam_progress:Физика 2025", "unicode"),
        ] {
            assert_eq!(kv.get(key).await.unwrap().as_deref(), Some(expected), "{key}");
        }

        let files = std::fs::read_dir(dir.path().join("progress")).unwrap().count();
        assert_eq!(files, 4);
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn file_kv_rejects_empty_and_oversized_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = FileKv::new(dir.path());
        assert!(matches!(kv.get("").await, Err(StoreError::InvalidKey(_))));
        let long = "k".repeat(MAX_FILE_KEY_BYTES + 1);
        assert!(matches!(kv.set(&long, String::new()).await, Err(StoreError::InvalidKey(_))));
    }
}
