//! PostgreSQL document store.
//!
//! Every record lives as a JSONB row in `resource_document`, keyed by
//! `(collection, id)`. Filters become a `data @> $filter` containment test
//! served by the GIN index; `seq` gives stable creation order.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::trace;
use uuid::Uuid;

use termbase_core::{DocumentStore, Error, Filter, Result};

const UNIQUE_VIOLATION: &str = "23505";

/// Document store over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_insert_error(collection: &str, id: Uuid, e: sqlx::Error) -> Error {
    let is_duplicate = e
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false);
    if is_duplicate {
        Error::Conflict(format!("{} document {} already exists", collection, id))
    } else {
        Error::Database(e)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_document (collection, id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(collection, id, e))?;

        trace!(
            subsystem = "db",
            component = "pg_store",
            op = "insert",
            collection,
            resource_id = %id,
            "Inserted document"
        );
        Ok(())
    }

    async fn update(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE resource_document
            SET data = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&doc)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} document {}", collection, id)));
        }
        trace!(
            subsystem = "db",
            component = "pg_store",
            op = "update",
            collection,
            resource_id = %id,
            "Updated document"
        );
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resource_document WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<JsonValue>> {
        sqlx::query_scalar::<_, JsonValue>(
            "SELECT data FROM resource_document WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>> {
        let docs = sqlx::query_scalar::<_, JsonValue>(
            r#"
            SELECT data FROM resource_document
            WHERE collection = $1 AND data @> $2
            ORDER BY seq
            "#,
        )
        .bind(collection)
        .bind(filter.to_json_object())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        trace!(
            subsystem = "db",
            component = "pg_store",
            op = "find",
            collection,
            result_count = docs.len(),
            "Find completed"
        );
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resource_document WHERE collection = $1 AND data @> $2",
        )
        .bind(collection)
        .bind(filter.to_json_object())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count.max(0) as u64)
    }
}
