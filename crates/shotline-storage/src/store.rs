//! The object store contract and its in-memory implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Collection-scoped key/value storage of JSON documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Insert or replace a document.
    async fn put(&self, collection: &str, id: &str, value: Value) -> StorageResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Value>>;

    /// Every document in a collection, ordered by id.
    async fn get_all(&self, collection: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool>;
}

/// Reject empty keys and anything that could escape a directory.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.chars().any(char::is_control)
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, collection: &str, id: &str, value: Value) -> StorageResult<()> {
        validate_key(collection)?;
        validate_key(id)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        validate_key(collection)?;
        validate_key(id)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn get_all(&self, collection: &str) -> StorageResult<Vec<(String, Value)>> {
        validate_key(collection)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        validate_key(collection)?;
        validate_key(id)?;
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}
