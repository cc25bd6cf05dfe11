//! Typed repositories over an [`ObjectStore`].

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use shotline_models::RunSnapshot;
use tracing::{info, warn};

use crate::error::StorageResult;
use crate::store::ObjectStore;

/// A type persisted as one document in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn document_id(&self) -> String;
}

impl Document for RunSnapshot {
    const COLLECTION: &'static str = "runs";

    fn document_id(&self) -> String {
        self.batch_id.to_string()
    }
}

/// Repository for documents of type `D`.
pub struct Repository<D> {
    store: Arc<dyn ObjectStore>,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Clone for Repository<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<D: Document> Repository<D> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Insert or replace a document.
    pub async fn save(&self, doc: &D) -> StorageResult<()> {
        let id = doc.document_id();
        let value = serde_json::to_value(doc)?;
        self.store.put(D::COLLECTION, &id, value).await?;
        info!(collection = D::COLLECTION, id = %id, "Saved document");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> StorageResult<Option<D>> {
        match self.store.get(D::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// All documents in the collection. Documents that no longer decode are
    /// skipped with a warning.
    pub async fn list(&self) -> StorageResult<Vec<D>> {
        let docs = self.store.get_all(D::COLLECTION).await?;
        let mut out = Vec::with_capacity(docs.len());
        for (id, value) in docs {
            match serde_json::from_value(value) {
                Ok(doc) => out.push(doc),
                Err(e) => warn!(collection = D::COLLECTION, id = %id, error = %e, "Skipping undecodable document"),
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, id: &str) -> StorageResult<bool> {
        self.store.delete(D::COLLECTION, id).await
    }
}
