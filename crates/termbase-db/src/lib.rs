//! # termbase-db
//!
//! Persistence layer for termbase.
//!
//! This crate provides:
//! - Document store backends (in-memory and PostgreSQL JSONB)
//! - Connection pool management
//! - A keyed lock table serializing check-then-write sequences
//! - Repositories implementing the resource/version pairing protocol:
//!   `persist_new`, `persist_changes`, `persist_clone`, `retire`
//! - Container propagation (source member indexes) and branch seeding
//!
//! ## Example
//!
//! ```rust,ignore
//! use termbase_db::{Database, Organization, Source, ParentRef, User};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/termbase").await?;
//!     db.migrate().await?;
//!
//!     let user = User::new("admin", "admin@example.org");
//!     db.users.create_user(&user).await?;
//!
//!     let mut org = Organization::new("CIEL", "Columbia International eHealth Laboratory");
//!     db.organizations.persist_new(&mut org).await;
//!
//!     let mut source = Source::new("CIEL", "CIEL");
//!     let errors = db
//!         .sources
//!         .persist_new(&mut source, Some(&user), Some(ParentRef::Organization(org.id)))
//!         .await;
//!     assert!(errors.is_empty());
//!     Ok(())
//! }
//! ```

pub mod concepts;
pub mod locks;
pub mod memory;
pub mod pg_store;
pub mod pool;
pub mod resources;
pub mod sources;
pub mod store;
pub mod users;
pub mod versions;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use them
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

// Re-export core types
pub use termbase_core::*;

pub use concepts::{ConceptRepository, ConceptVersionRepository};
pub use locks::KeyedLocks;
pub use memory::MemoryStore;
pub use pg_store::PgDocumentStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig, PoolStats};
pub use sources::{seed_concepts, SourceRepository, SourceVersionRepository, VersionChanges};
pub use store::RecordStore;
pub use users::{OrganizationRepository, UserRepository};

/// Combined persistence context with all repositories sharing one store.
#[derive(Clone)]
pub struct Database {
    /// Typed store shared by every repository.
    pub store: RecordStore,
    /// Connection pool when backed by PostgreSQL.
    pool: Option<PgPool>,
    pub users: UserRepository,
    pub organizations: OrganizationRepository,
    pub sources: SourceRepository,
    pub source_versions: SourceVersionRepository,
    pub concepts: ConceptRepository,
    pub concept_versions: ConceptVersionRepository,
}

impl Database {
    /// Build repositories over an existing store.
    pub fn new(store: RecordStore) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            organizations: OrganizationRepository::new(store.clone()),
            sources: SourceRepository::new(store.clone()),
            source_versions: SourceVersionRepository::new(store.clone()),
            concepts: ConceptRepository::new(store.clone()),
            concept_versions: ConceptVersionRepository::new(store.clone()),
            store,
            pool: None,
        }
    }

    /// Database over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(RecordStore::memory())
    }

    /// Database over a PostgreSQL pool.
    pub fn from_pool(pool: PgPool) -> Self {
        log_pool_metrics(&pool);
        let store = RecordStore::new(Arc::new(PgDocumentStore::new(pool.clone())));
        Self {
            pool: Some(pool),
            ..Self::new(store)
        }
    }

    /// Connect to PostgreSQL with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with a custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Open the store named by the configuration: PostgreSQL when a database
    /// URL is set, otherwise in-memory.
    pub async fn from_config(config: &TermbaseConfig) -> Result<Self> {
        match &config.database.url {
            Some(url) => {
                Self::connect_with_config(url, PoolConfig::from_settings(&config.database)).await
            }
            None => {
                info!(
                    subsystem = "db",
                    component = "database",
                    op = "open",
                    "No database URL configured, using in-memory store"
                );
                Ok(Self::in_memory())
            }
        }
    }

    /// Run pending migrations. A no-op for the in-memory store.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        if let Some(pool) = &self.pool {
            sqlx::migrate!("../../migrations")
                .run(pool)
                .await
                .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        }
        Ok(())
    }

    /// The underlying connection pool, if any.
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}
