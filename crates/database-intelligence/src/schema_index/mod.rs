//! Schema index module - stored schema descriptors and registered target databases

pub mod descriptor;
pub mod indexer;
pub mod memory_index;
pub mod profile_store;
pub mod schema;
pub mod sqlite_index;

pub use descriptor::SchemaDescriptor;
pub use indexer::SchemaIndexer;
pub use memory_index::InMemorySchemaIndex;
pub use profile_store::{ConnectionProfile, InMemoryProfileRepository, ProfileRepository, SqliteProfileStore};
pub use sqlite_index::SqliteSchemaIndex;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::context_engine::similarity::{rank, Ranked};

/// Per-database collection of schema descriptors.
///
/// Reads may run concurrently; writes are serialized by the backing store.
#[async_trait]
pub trait SchemaIndex: Send + Sync {
    /// Stores a descriptor, replacing any existing one with the same `(database_id, name)`.
    async fn add(&self, descriptor: SchemaDescriptor) -> anyhow::Result<SchemaDescriptor>;

    async fn list(&self, database_id: i64) -> anyhow::Result<Vec<SchemaDescriptor>>;

    async fn get(&self, id: i64) -> anyhow::Result<Option<SchemaDescriptor>>;

    async fn remove(&self, id: i64) -> anyhow::Result<bool>;

    /// Top-k descriptors of one database by cosine similarity.
    ///
    /// Linear scan; stores with a real nearest-neighbor structure override this.
    async fn search(
        &self,
        database_id: i64,
        query: &[f32],
        top_k: usize,
    ) -> anyhow::Result<Vec<Ranked<SchemaDescriptor>>> {
        let candidates = self.list(database_id).await?;
        Ok(rank(query, candidates, top_k)?)
    }
}

/// SQLite file holding both the descriptor index and the profile registry.
pub struct IndexDatabase {
    pub schemas: SqliteSchemaIndex,
    pub profiles: SqliteProfileStore,
}

impl IndexDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening schema index at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            schema::initialize_database(&mut conn)?;
        }

        info!("Schema index initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Single-connection pool; every `:memory:` connection would otherwise be its own database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        {
            let mut conn = pool.get()?;
            schema::initialize_database(&mut conn)?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            schemas: SqliteSchemaIndex::new(Arc::clone(&pool)),
            profiles: SqliteProfileStore::new(pool),
        }
    }
}
