//! Keyed async mutexes serializing check-then-write sequences.
//!
//! Three key families are used, always acquired in this order:
//!
//! 1. `scope:<collection>:<parent>`: mnemonic uniqueness among siblings
//! 2. `versions:<collection>:<versioned object>`: one version chain
//! 3. `record:<collection>:<id>`: read-modify-write of a single record
//!
//! Locks are process-local. Deployments running several writers against one
//! PostgreSQL database need an external coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use termbase_core::ParentRef;

/// Guard returned by [`KeyedLocks::lock`]; the key is released on drop.
pub type KeyGuard = OwnedMutexGuard<()>;

/// Table of named async mutexes, created on demand.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for `key`, waiting for any current holder.
    pub async fn lock(&self, key: impl Into<String>) -> KeyGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on are dropped.
            table.retain(|_, m| Arc::strong_count(m) > 1);
            table.entry(key.into()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|m| Arc::strong_count(m) > 1).count()
    }
}

/// Key guarding mnemonic uniqueness among resources sharing a parent.
pub fn scope_key(collection: &str, parent: Option<&ParentRef>) -> String {
    match parent {
        Some(parent) => format!("scope:{}:{}", collection, parent),
        None => format!("scope:{}", collection),
    }
}

/// Key guarding the version chain of one resource.
pub fn versions_key(collection: &str, versioned_object_id: Uuid) -> String {
    format!("versions:{}:{}", collection, versioned_object_id)
}

/// Key guarding read-modify-write of one record.
pub fn record_key(collection: &str, id: Uuid) -> String {
    format!("record:{}:{}", collection, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("record:a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("record:a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("record:a").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock("record:b"))
            .await
            .expect("distinct key should be free");
        assert_eq!(locks.active_keys(), 2);
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.lock("scope:a").await);
        let _b = locks.lock("scope:b").await;
        assert_eq!(locks.active_keys(), 1);
        assert_eq!(locks.table.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_key_formats() {
        let id = Uuid::nil();
        assert_eq!(
            scope_key("concept", Some(&ParentRef::Source(id))),
            format!("scope:concept:Source:{}", id)
        );
        assert_eq!(scope_key("organization", None), "scope:organization");
        assert_eq!(
            versions_key("concept_version", id),
            format!("versions:concept_version:{}", id)
        );
        assert_eq!(
            record_key("source_version", id),
            format!("record:source_version:{}", id)
        );
    }
}
