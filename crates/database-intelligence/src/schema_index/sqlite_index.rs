//! SQLite-backed schema descriptor store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::debug;

use super::descriptor::SchemaDescriptor;
use super::SchemaIndex;

const SELECT_COLUMNS: &str =
    "id, database_id, name, description, embedding, metadata, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteSchemaIndex {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteSchemaIndex {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Inserts, or replaces description/vector/metadata of the existing `(database_id, name)` row.
    pub fn upsert_descriptor(&self, descriptor: &SchemaDescriptor) -> anyhow::Result<SchemaDescriptor> {
        let embedding_bytes = bincode::serialize(&descriptor.vector)?;
        let metadata = serde_json::to_string(&descriptor.metadata)?;
        let now = Utc::now();
        let conn = self.get_conn()?;

        let (id, created_at): (i64, String) = conn.query_row(
            "INSERT INTO schema_descriptors
                (database_id, name, description, embedding, dimension, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(database_id, name) DO UPDATE SET
                description = excluded.description,
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
             RETURNING id, created_at",
            params![
                descriptor.database_id,
                &descriptor.name,
                &descriptor.description,
                embedding_bytes,
                descriptor.vector.len() as i64,
                metadata,
                now.to_rfc3339(),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        debug!(
            "Stored schema descriptor {} ({}) for database {}",
            id, descriptor.name, descriptor.database_id
        );

        Ok(SchemaDescriptor {
            id,
            created_at: parse_timestamp(&created_at)?,
            updated_at: now,
            ..descriptor.clone()
        })
    }

    pub fn descriptors_for_database(&self, database_id: i64) -> anyhow::Result<Vec<SchemaDescriptor>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM schema_descriptors WHERE database_id = ?1 ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([database_id], row_to_descriptor)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn descriptor_by_id(&self, id: i64) -> anyhow::Result<Option<SchemaDescriptor>> {
        let conn = self.get_conn()?;
        let descriptor = conn
            .query_row(
                &format!("SELECT {} FROM schema_descriptors WHERE id = ?1", SELECT_COLUMNS),
                [id],
                row_to_descriptor,
            )
            .optional()?;
        Ok(descriptor)
    }

    pub fn delete_descriptor(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM schema_descriptors WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl SchemaIndex for SqliteSchemaIndex {
    async fn add(&self, descriptor: SchemaDescriptor) -> anyhow::Result<SchemaDescriptor> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.upsert_descriptor(&descriptor)).await?
    }

    async fn list(&self, database_id: i64) -> anyhow::Result<Vec<SchemaDescriptor>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.descriptors_for_database(database_id)).await?
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<SchemaDescriptor>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.descriptor_by_id(id)).await?
    }

    async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.delete_descriptor(id)).await?
    }
}

fn row_to_descriptor(row: &Row) -> rusqlite::Result<SchemaDescriptor> {
    let embedding_bytes: Vec<u8> = row.get(4)?;
    let vector: Vec<f32> = bincode::deserialize(&embedding_bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Blob, e))?;

    let metadata_str: String = row.get(5)?;
    let metadata = serde_json::from_str(&metadata_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(SchemaDescriptor {
        id: row.get(0)?,
        database_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        vector,
        metadata,
        created_at: column_timestamp(row, 6)?,
        updated_at: column_timestamp(row, 7)?,
    })
}

pub(crate) fn column_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_index::IndexDatabase;
    use serde_json::json;

    fn index() -> SqliteSchemaIndex {
        IndexDatabase::new_in_memory().unwrap().schemas
    }

    // ===== Write Path Tests =====

    #[tokio::test]
    async fn test_add_assigns_id_and_round_trips_vector() {
        let index = index();
        let stored = index
            .add(SchemaDescriptor::new(
                1,
                "orders",
                "orders table with id, customer_id, total",
                vec![0.25, -0.5, 1.0],
                json!({"columns": 3}),
            ))
            .await
            .unwrap();

        assert!(stored.id > 0);
        let loaded = index.get(stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.vector, vec![0.25, -0.5, 1.0]);
        assert_eq!(loaded.metadata, json!({"columns": 3}));
        assert_eq!(loaded.name, "orders");
    }

    #[tokio::test]
    async fn test_reindex_replaces_whole_descriptor() {
        let index = index();
        let first = index
            .add(SchemaDescriptor::new(1, "orders", "old", vec![1.0, 0.0], json!({})))
            .await
            .unwrap();
        let second = index
            .add(SchemaDescriptor::new(1, "orders", "new", vec![0.0, 1.0], json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        let all = index.list(1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "new");
        assert_eq!(all[0].vector, vec![0.0, 1.0]);
    }

    // ===== Read Path Tests =====

    #[tokio::test]
    async fn test_list_is_scoped_to_database() {
        let index = index();
        index
            .add(SchemaDescriptor::new(1, "orders", "o", vec![1.0], json!({})))
            .await
            .unwrap();
        index
            .add(SchemaDescriptor::new(2, "users", "u", vec![1.0], json!({})))
            .await
            .unwrap();

        let names: Vec<_> = index.list(1).await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["orders"]);
        assert!(index.list(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let index = index();
        let stored = index
            .add(SchemaDescriptor::new(1, "orders", "o", vec![1.0], json!({})))
            .await
            .unwrap();

        assert!(index.remove(stored.id).await.unwrap());
        assert!(!index.remove(stored.id).await.unwrap());
        assert!(index.get(stored.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_ranks_stored_vectors() {
        let index = index();
        index
            .add(SchemaDescriptor::new(1, "users", "u", vec![0.0, 1.0], json!({})))
            .await
            .unwrap();
        index
            .add(SchemaDescriptor::new(1, "orders", "o", vec![1.0, 0.1], json!({})))
            .await
            .unwrap();

        let hits = index.search(1, &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.name, "orders");
    }
}
