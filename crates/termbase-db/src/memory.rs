//! In-memory document store.
//!
//! Used by tests and by the CLI when no `DATABASE_URL` is configured.
//! Documents keep their insertion sequence so `find` returns them oldest
//! first, matching the PostgreSQL backend's `ORDER BY seq`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use termbase_core::{DocumentStore, Error, Filter, Result};

#[derive(Debug, Default)]
struct CollectionData {
    by_seq: BTreeMap<u64, (Uuid, JsonValue)>,
    seq_of: HashMap<Uuid, u64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_seq: u64,
    collections: HashMap<String, CollectionData>,
}

/// Document store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()> {
        let mut state = self.state.write().await;
        state.next_seq += 1;
        let seq = state.next_seq;
        let data = state.collections.entry(collection.to_string()).or_default();
        if data.seq_of.contains_key(&id) {
            return Err(Error::Conflict(format!(
                "{} document {} already exists",
                collection, id
            )));
        }
        data.seq_of.insert(id, seq);
        data.by_seq.insert(seq, (id, doc));
        trace!(
            subsystem = "db",
            component = "memory_store",
            op = "insert",
            collection,
            resource_id = %id,
            "Inserted document"
        );
        Ok(())
    }

    async fn update(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()> {
        let mut state = self.state.write().await;
        let data = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("{} document {}", collection, id)))?;
        let seq = *data
            .seq_of
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("{} document {}", collection, id)))?;
        data.by_seq.insert(seq, (id, doc));
        trace!(
            subsystem = "db",
            component = "memory_store",
            op = "update",
            collection,
            resource_id = %id,
            "Updated document"
        );
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        match data.seq_of.remove(&id) {
            Some(seq) => {
                data.by_seq.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<JsonValue>> {
        let state = self.state.read().await;
        Ok(state.collections.get(collection).and_then(|data| {
            data.seq_of
                .get(&id)
                .and_then(|seq| data.by_seq.get(seq))
                .map(|(_, doc)| doc.clone())
        }))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>> {
        let state = self.state.read().await;
        let docs: Vec<JsonValue> = state
            .collections
            .get(collection)
            .map(|data| {
                data.by_seq
                    .values()
                    .filter(|(_, doc)| filter.matches(doc))
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default();
        trace!(
            subsystem = "db",
            component = "memory_store",
            op = "find",
            collection,
            result_count = docs.len(),
            "Find completed"
        );
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map(|data| {
                data.by_seq
                    .values()
                    .filter(|(_, doc)| filter.matches(doc))
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        store.insert("concept", id, json!({ "mnemonic": "c1" })).await.unwrap();

        let doc = store.get("concept", id).await.unwrap().unwrap();
        assert_eq!(doc["mnemonic"], "c1");
        assert!(store.get("source", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        store.insert("concept", id, json!({})).await.unwrap();
        let err = store.insert("concept", id, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("concept", Uuid::now_v7(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_creation_order() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        store.insert("c", a, json!({ "n": 1, "k": "x" })).await.unwrap();
        store.insert("c", b, json!({ "n": 2, "k": "x" })).await.unwrap();
        store.update("c", a, json!({ "n": 3, "k": "x" })).await.unwrap();

        let docs = store.find("c", &Filter::all().eq("k", "x")).await.unwrap();
        let ns: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_find_and_count_filter() {
        let store = MemoryStore::new();
        for (i, released) in [true, false, true].into_iter().enumerate() {
            store
                .insert("v", Uuid::now_v7(), json!({ "i": i, "released": released }))
                .await
                .unwrap();
        }
        let filter = Filter::all().eq("released", true);
        assert_eq!(store.find("v", &filter).await.unwrap().len(), 2);
        assert_eq!(store.count("v", &filter).await.unwrap(), 2);
        assert_eq!(store.count("v", &Filter::all()).await.unwrap(), 3);
        assert_eq!(store.count("missing", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        store.insert("c", id, json!({})).await.unwrap();
        assert!(store.delete("c", id).await.unwrap());
        assert!(!store.delete("c", id).await.unwrap());
        assert!(!store.delete("other", id).await.unwrap());
    }
}
