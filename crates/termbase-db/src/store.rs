//! Typed record access over any [`DocumentStore`].

use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use termbase_core::{DocumentStore, Error, Filter, Record, Result};

use crate::locks::KeyedLocks;
use crate::memory::MemoryStore;

/// Shared handle to a document backend plus the lock table guarding it.
///
/// Cheap to clone; every repository holds one.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn DocumentStore>,
    locks: Arc<KeyedLocks>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Store over a fresh in-memory backend.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &Arc<dyn DocumentStore> {
        &self.backend
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    pub async fn insert<T: Record>(&self, record: &T) -> Result<()> {
        self.backend
            .insert(T::COLLECTION, record.id(), serde_json::to_value(record)?)
            .await
    }

    pub async fn update<T: Record>(&self, record: &T) -> Result<()> {
        self.backend
            .update(T::COLLECTION, record.id(), serde_json::to_value(record)?)
            .await
    }

    pub async fn delete<T: Record>(&self, id: Uuid) -> Result<bool> {
        self.backend.delete(T::COLLECTION, id).await
    }

    pub async fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>> {
        self.backend
            .get(T::COLLECTION, id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Like [`RecordStore::get`], failing with `NotFound` when absent.
    pub async fn require<T: Record>(&self, id: Uuid) -> Result<T> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::COLLECTION, id)))
    }

    /// Whether a document with this id exists in `collection`.
    pub async fn exists(&self, collection: &str, id: Uuid) -> Result<bool> {
        Ok(self.backend.get(collection, id).await?.is_some())
    }

    /// All matching records, oldest first.
    pub async fn find<T: Record>(&self, filter: &Filter) -> Result<Vec<T>> {
        self.backend
            .find(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Oldest matching record.
    pub async fn find_one<T: Record>(&self, filter: &Filter) -> Result<Option<T>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Most recently created matching record.
    pub async fn latest<T: Record>(&self, filter: &Filter) -> Result<Option<T>> {
        Ok(self.find(filter).await?.pop())
    }

    pub async fn count<T: Record>(&self, filter: &Filter) -> Result<u64> {
        self.backend.count(T::COLLECTION, filter).await
    }
}

fn decode<T: Record>(doc: JsonValue) -> Result<T> {
    Ok(serde_json::from_value(doc)?)
}
