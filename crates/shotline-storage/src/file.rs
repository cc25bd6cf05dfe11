//! JSON file backed store: one file per collection.
//!
//! Each collection lives at `<root>/<collection>.json` as a single JSON
//! object keyed by document id. Writes go to a temporary file that is then
//! renamed over the original, so a crash never leaves a half-written file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, ObjectStore};

type Collection = BTreeMap<String, Value>;

pub struct JsonFileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::config_error(format!(
                "cannot create data directory {}: {}",
                root.display(),
                e
            ))
        })?;
        debug!(root = %root.display(), "Opened JSON file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", collection))
    }

    async fn load(&self, collection: &str) -> StorageResult<Collection> {
        let path = self.collection_path(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Collection::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            collection: collection.to_string(),
            message: e.to_string(),
        })
    }

    async fn save(&self, collection: &str, docs: &Collection) -> StorageResult<()> {
        let path = self.collection_path(collection);
        let tmp = self.root.join(format!("{}.json.tmp", collection));
        let bytes = serde_json::to_vec_pretty(docs)?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", path.display(), e)))?;

        debug!(collection, documents = docs.len(), bytes = bytes.len(), "Saved collection");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for JsonFileStore {
    async fn put(&self, collection: &str, id: &str, value: Value) -> StorageResult<()> {
        validate_key(collection)?;
        validate_key(id)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        docs.insert(id.to_string(), value);
        self.save(collection, &docs).await
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        validate_key(collection)?;
        validate_key(id)?;
        let mut docs = self.load(collection).await?;
        Ok(docs.remove(id))
    }

    async fn get_all(&self, collection: &str) -> StorageResult<Vec<(String, Value)>> {
        validate_key(collection)?;
        Ok(self.load(collection).await?.into_iter().collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        validate_key(collection)?;
        validate_key(id)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        if docs.remove(id).is_none() {
            return Ok(false);
        }
        self.save(collection, &docs).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.put("runs", "a", json!({"success": true})).await.unwrap();
            store.put("runs", "b", json!({"success": false})).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("runs", "a").await.unwrap(), Some(json!({"success": true})));
        assert_eq!(store.get_all("runs").await.unwrap().len(), 2);
        assert!(dir.path().join("runs.json").exists());
        assert!(!dir.path().join("runs.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        assert!(store.get_all("settings").await.unwrap().is_empty());
        assert_eq!(store.get("settings", "x").await.unwrap(), None);
        assert!(!store.delete("settings", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        store.put("settings", "theme", json!("dark")).await.unwrap();
        assert!(store.delete("settings", "theme").await.unwrap());

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get("settings", "theme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_collection_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("runs.json"), b"{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let err = store.get_all("runs").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let err = store.put("../outside", "x", json!(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
