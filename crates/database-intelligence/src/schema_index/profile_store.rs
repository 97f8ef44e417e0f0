//! Registry of target databases and how to reach them

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::sqlite_index::column_timestamp;

/// Connection details for one registered target database.
///
/// `password` is accepted on input but never serialized back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// `postgres`, `mysql` or `sqlite`. Checked at execution time, not on save.
    #[serde(alias = "databaseType", alias = "type")]
    pub dialect: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(alias = "databaseName")]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ConnectionProfile {
    pub fn has_password(&self) -> bool {
        self.password.as_deref().map_or(false, |p| !p.is_empty())
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Inserts when `id == 0`, otherwise replaces the row with that id.
    /// Timestamps are set here, never taken from the caller.
    async fn save(&self, profile: ConnectionProfile) -> anyhow::Result<ConnectionProfile>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<ConnectionProfile>>;
    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<ConnectionProfile>>;
    async fn find_all(&self) -> anyhow::Result<Vec<ConnectionProfile>>;
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
}

const PROFILE_COLUMNS: &str =
    "id, name, dialect, host, port, database_name, username, password, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteProfileStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    fn save_profile(&self, mut profile: ConnectionProfile) -> anyhow::Result<ConnectionProfile> {
        let conn = self.get_conn()?;
        let now = Utc::now();

        if profile.id == 0 {
            conn.execute(
                "INSERT INTO database_profiles
                    (name, dialect, host, port, database_name, username, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    &profile.name,
                    &profile.dialect,
                    &profile.host,
                    profile.port,
                    &profile.database,
                    &profile.username,
                    &profile.password,
                    now.to_rfc3339(),
                ],
            )?;
            profile.id = conn.last_insert_rowid();
            profile.created_at = now;
        } else {
            let updated = conn.execute(
                "UPDATE database_profiles SET
                    name = ?2, dialect = ?3, host = ?4, port = ?5, database_name = ?6,
                    username = ?7, password = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    profile.id,
                    &profile.name,
                    &profile.dialect,
                    &profile.host,
                    profile.port,
                    &profile.database,
                    &profile.username,
                    &profile.password,
                    now.to_rfc3339(),
                ],
            )?;
            if updated == 0 {
                return Err(anyhow::anyhow!("Database not found with ID: {}", profile.id));
            }
            profile.created_at = conn.query_row(
                "SELECT created_at FROM database_profiles WHERE id = ?1",
                [profile.id],
                |row| column_timestamp(row, 0),
            )?;
        }

        profile.updated_at = now;
        Ok(profile)
    }

    fn query_one(&self, clause: &str, param: &dyn rusqlite::ToSql) -> anyhow::Result<Option<ConnectionProfile>> {
        let conn = self.get_conn()?;
        let profile = conn
            .query_row(
                &format!("SELECT {} FROM database_profiles WHERE {}", PROFILE_COLUMNS, clause),
                [param],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    fn all_profiles(&self) -> anyhow::Result<Vec<ConnectionProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM database_profiles ORDER BY id",
            PROFILE_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_profile)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_profile(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM database_profiles WHERE id = ?1", [id])? > 0)
    }
}

#[async_trait]
impl ProfileRepository for SqliteProfileStore {
    async fn save(&self, profile: ConnectionProfile) -> anyhow::Result<ConnectionProfile> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_profile(profile)).await?
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<ConnectionProfile>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.query_one("id = ?1", &id)).await?
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<ConnectionProfile>> {
        let store = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || store.query_one("name = ?1", &name)).await?
    }

    async fn find_all(&self) -> anyhow::Result<Vec<ConnectionProfile>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.all_profiles()).await?
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.delete_profile(id)).await?
    }
}

fn row_to_profile(row: &Row) -> rusqlite::Result<ConnectionProfile> {
    Ok(ConnectionProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        dialect: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
        database: row.get(5)?,
        username: row.get(6)?,
        password: row.get(7)?,
        created_at: column_timestamp(row, 8)?,
        updated_at: column_timestamp(row, 9)?,
    })
}

/// DashMap-backed repository for tests and ephemeral runs.
pub struct InMemoryProfileRepository {
    profiles: DashMap<i64, ConnectionProfile>,
    next_id: AtomicI64,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryProfileRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn save(&self, mut profile: ConnectionProfile) -> anyhow::Result<ConnectionProfile> {
        let now = Utc::now();
        if profile.id == 0 {
            profile.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            profile.created_at = now;
        } else {
            let existing = self
                .profiles
                .get(&profile.id)
                .ok_or_else(|| anyhow::anyhow!("Database not found with ID: {}", profile.id))?;
            profile.created_at = existing.created_at;
        }
        profile.updated_at = now;
        self.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<ConnectionProfile>> {
        Ok(self.profiles.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<ConnectionProfile>> {
        Ok(self
            .profiles
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value().clone()))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<ConnectionProfile>> {
        let mut all: Vec<_> = self.profiles.iter().map(|p| p.value().clone()).collect();
        all.sort_by_key(|p| p.id);
        Ok(all)
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.profiles.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_index::IndexDatabase;
    use serde_json::json;

    fn profile(name: &str) -> ConnectionProfile {
        ConnectionProfile {
            id: 0,
            name: name.to_string(),
            dialect: "postgres".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "shop".to_string(),
            username: "reader".to_string(),
            password: Some("secret".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn exercise(repo: &dyn ProfileRepository) {
        let saved = repo.save(profile("shop")).await.unwrap();
        assert!(saved.id > 0);

        let found = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(found.password.as_deref(), Some("secret"));
        assert_eq!(found.port, 5432);
        assert!(repo.find_by_name("shop").await.unwrap().is_some());
        assert!(repo.find_by_name("other").await.unwrap().is_none());

        let mut changed = found.clone();
        changed.host = "db.internal".to_string();
        let updated = repo.save(changed).await.unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, found.created_at);
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
        assert_eq!(
            repo.find_by_id(saved.id).await.unwrap().unwrap().host,
            "db.internal"
        );

        assert!(repo.delete(saved.id).await.unwrap());
        assert!(repo.find_by_id(saved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_profile_store() {
        let db = IndexDatabase::new_in_memory().unwrap();
        exercise(&db.profiles).await;
    }

    #[tokio::test]
    async fn test_in_memory_profile_store() {
        exercise(&InMemoryProfileRepository::new()).await;
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let repo = InMemoryProfileRepository::new();
        let mut p = profile("ghost");
        p.id = 99;
        assert!(repo.save(p).await.is_err());
    }

    #[test]
    fn test_password_never_serialized() {
        let value = serde_json::to_value(profile("shop")).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["dialect"], "postgres");
    }

    #[test]
    fn test_deserialize_legacy_field_names() {
        let p: ConnectionProfile = serde_json::from_value(json!({
            "name": "local",
            "databaseType": "mysql",
            "host": "localhost",
            "port": 3306,
            "databaseName": "shop",
            "username": "root"
        }))
        .unwrap();
        assert_eq!(p.dialect, "mysql");
        assert_eq!(p.database, "shop");
        assert!(!p.has_password());
    }
}
