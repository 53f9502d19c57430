//! Object storage seam
//!
//! The registry never touches a blob backend directly; it goes through
//! `ObjectStore`, so production can bind an S3-style service while tests
//! run against `MemoryObjectStore`. The in-memory store carries tamper and
//! outage knobs for exercising the integrity verifier.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Content-addressed-ish blob storage. Keys are opaque to callers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory object store.
///
/// `tamper` and `remove` mutate stored bytes behind the registry's back;
/// `set_offline` makes every call fail. These exist so tests can produce
/// modified, missing and unreachable objects without a real backend.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    offline: RwLock<bool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap() = offline;
    }

    /// Overwrite stored bytes without going through the registry.
    pub fn tamper(&self, key: &str, bytes: &[u8]) {
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    /// Drop an object without going through the registry.
    pub fn remove(&self, key: &str) {
        self.objects.write().unwrap().remove(key);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if *self.offline.read().unwrap() {
            Err(StorageError::Unavailable("store is offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_online()?;
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check_online()?;
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_online()?;
        self.objects.write().unwrap().remove(key);
        Ok(())
    }
}

/// Filesystem-backed object store rooted at a directory.
///
/// Keys map onto relative paths below the root, one file per object.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
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

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryObjectStore::new();
        store.put("a/b", b"payload").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let store = MemoryObjectStore::new();
        store.put("k", b"x").await.unwrap();
        store.set_offline(true);
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            store.put("k2", b"y").await,
            Err(StorageError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put("trades/t1/documents/d1", b"bytes").await.unwrap();
        assert_eq!(store.get("trades/t1/documents/d1").await.unwrap(), b"bytes");
        assert!(matches!(
            store.get("trades/t1/documents/other").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(dir.path().join("trades/t1/documents/d1").is_file());
    }

    #[tokio::test]
    async fn test_tamper_and_remove() {
        let store = MemoryObjectStore::new();
        store.put("k", b"original").await.unwrap();
        store.tamper("k", b"mutated");
        assert_eq!(store.get("k").await.unwrap(), b"mutated");
        store.remove("k");
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryObjectStore::new();
        store.put("k", b"bytes").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::NotFound(_))
        ));
        // Absent key is fine.
        store.delete("k").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let fs = FsObjectStore::new(dir.path());
        fs.put("a/b", b"bytes").await.unwrap();
        fs.delete("a/b").await.unwrap();
        assert!(!dir.path().join("a/b").exists());
        fs.delete("a/b").await.unwrap();
    }
}
