//! Local SQLite files opened read-only through rusqlite
//!
//! Files are confined to one data directory so a profile cannot point the
//! executor at the service's own index database.

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::connection::{classify_connect_failure, ConnectionFailureKind, ExecutionFailure};
use super::value::sqlite_value;
use super::{DriverSession, QueryDriver, RowSet};
use crate::schema_index::ConnectionProfile;

/// `profile.database` is a file path, relative paths resolve against the data
/// directory. Host and port are ignored.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    data_dir: PathBuf,
    blocked: Vec<PathBuf>,
}

impl SqliteDriver {
    /// Only files that canonicalize to a location under `data_dir` may be opened.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            blocked: Vec::new(),
        }
    }

    /// Refuse this file even when it sits inside the data directory.
    pub fn with_blocked_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blocked.push(path.into());
        self
    }

    /// Canonical path of the requested file, or the reason it may not be opened.
    fn resolve(&self, database: &str) -> Result<PathBuf, ConnectionFailureKind> {
        let not_allowed = || ConnectionFailureKind::PathNotAllowed {
            path: database.to_string(),
        };

        let root = self.data_dir.canonicalize().map_err(|e| {
            warn!("SQLite data directory {} unavailable: {}", self.data_dir.display(), e);
            not_allowed()
        })?;

        let requested = Path::new(database);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        let resolved = match joined.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let parent_inside = joined
                    .parent()
                    .and_then(|parent| parent.canonicalize().ok())
                    .map_or(false, |parent| parent.starts_with(&root));
                return Err(if parent_inside {
                    ConnectionFailureKind::DatabaseMissing {
                        database: database.to_string(),
                    }
                } else {
                    not_allowed()
                });
            }
            Err(_) => return Err(not_allowed()),
        };

        if !resolved.starts_with(&root) {
            return Err(not_allowed());
        }
        let blocked = self
            .blocked
            .iter()
            .filter_map(|path| path.canonicalize().ok())
            .any(|path| path == resolved);
        if blocked {
            return Err(not_allowed());
        }

        Ok(resolved)
    }

    fn open(&self, profile: &ConnectionProfile) -> Result<Connection, ExecutionFailure> {
        let path = self.resolve(&profile.database).map_err(|kind| {
            if let ConnectionFailureKind::PathNotAllowed { .. } = &kind {
                warn!("Refused sqlite path for profile {}: {}", profile.name, profile.database);
            }
            ExecutionFailure::Connection(kind)
        })?;

        open_read_only(&path).map_err(|e| {
            ExecutionFailure::Connection(match e.sqlite_error_code() {
                Some(ErrorCode::CannotOpen) => ConnectionFailureKind::DatabaseMissing {
                    database: profile.database.clone(),
                },
                _ => classify_connect_failure(profile, None, &e.to_string()),
            })
        })
    }
}

#[async_trait]
impl QueryDriver for SqliteDriver {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        statement_timeout: Duration,
    ) -> Result<Box<dyn DriverSession>, ExecutionFailure> {
        let driver = self.clone();
        let target = profile.clone();
        let conn = tokio::task::spawn_blocking(move || driver.open(&target))
            .await
            .map_err(|e| ExecutionFailure::Unexpected(e.to_string()))??;

        debug!("Opened sqlite database {} read-only", profile.database);
        Ok(Box::new(SqliteSession {
            conn: Some(conn),
            statement_timeout,
        }))
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

struct SqliteSession {
    /// Moved into the blocking task for each call and handed back afterwards.
    conn: Option<Connection>,
    statement_timeout: Duration,
}

impl SqliteSession {
    fn take_conn(&mut self) -> Result<Connection, ExecutionFailure> {
        self.conn
            .take()
            .ok_or_else(|| ExecutionFailure::Unexpected("sqlite connection already released".into()))
    }
}

#[async_trait]
impl DriverSession for SqliteSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet, ExecutionFailure> {
        let conn = self.take_conn()?;
        let timeout = self.statement_timeout;

        // The interrupt fires from its own task so it still lands if this future is dropped
        let interrupt = conn.get_interrupt_handle();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            interrupt.interrupt();
        });

        let sql = sql.to_string();
        let joined = tokio::task::spawn_blocking(move || {
            let result = run_query(&conn, &sql);
            (conn, result)
        })
        .await;
        timer.abort();

        let (conn, result) = joined.map_err(|e| ExecutionFailure::Unexpected(e.to_string()))?;
        self.conn = Some(conn);

        result.map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => ExecutionFailure::Timeout {
                seconds: timeout.as_secs(),
            },
            _ => ExecutionFailure::Sql(e.to_string()),
        })
    }

    async fn ping(&mut self) -> Result<(), ExecutionFailure> {
        let conn = self.take_conn()?;
        let joined = tokio::task::spawn_blocking(move || {
            let result = conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0));
            (conn, result)
        })
        .await;

        let (conn, result) = joined.map_err(|e| ExecutionFailure::Unexpected(e.to_string()))?;
        self.conn = Some(conn);
        result
            .map(|_| ())
            .map_err(|e| ExecutionFailure::Connection(ConnectionFailureKind::Other(e.to_string())))
    }

    async fn close(self: Box<Self>) {
        if let Some(conn) = self.conn {
            if let Err((_, e)) = conn.close() {
                warn!("Error closing sqlite connection: {}", e);
            }
        }
    }
}

fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut materialized = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = serde_json::Map::new();
        for (idx, name) in columns.iter().enumerate() {
            map.insert(name.clone(), sqlite_value(row.get_ref(idx)?));
        }
        materialized.push(map);
    }

    Ok(RowSet {
        columns,
        rows: materialized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ConnectionProfile) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, total REAL, note BLOB);
             INSERT INTO orders VALUES (1, 10, 25.5, x'beef');
             INSERT INTO orders VALUES (2, 11, 40.0, NULL);",
        )
        .unwrap();

        let profile = ConnectionProfile {
            id: 1,
            name: "shop".into(),
            dialect: "sqlite".into(),
            host: String::new(),
            port: 0,
            database: path.to_string_lossy().into_owned(),
            username: String::new(),
            password: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (dir, profile)
    }

    fn driver(dir: &TempDir) -> SqliteDriver {
        SqliteDriver::new(dir.path())
    }

    async fn refused(driver: &SqliteDriver, profile: &ConnectionProfile) -> ExecutionFailure {
        match driver.connect(profile, Duration::from_secs(5)).await {
            Err(e) => e,
            Ok(_) => panic!("expected {} to be refused", profile.database),
        }
    }

    #[tokio::test]
    async fn test_select_materializes_rows_in_column_order() {
        let (dir, profile) = fixture();
        let mut session = driver(&dir).connect(&profile, Duration::from_secs(5)).await.unwrap();

        let set = session.query("SELECT id, customer_id, total, note FROM orders ORDER BY id").await.unwrap();
        session.close().await;

        assert_eq!(set.columns, vec!["id", "customer_id", "total", "note"]);
        assert_eq!(set.rows.len(), 2);
        let keys: Vec<_> = set.rows[0].keys().cloned().collect();
        assert_eq!(keys, set.columns);
        assert_eq!(set.rows[0]["total"], serde_json::json!(25.5));
        assert_eq!(set.rows[0]["note"], serde_json::json!("beef"));
        assert!(set.rows[1]["note"].is_null());
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let (dir, profile) = fixture();
        let mut session = driver(&dir).connect(&profile, Duration::from_secs(5)).await.unwrap();
        let set = session.query("SELECT id, total FROM orders WHERE id < 0").await.unwrap();
        assert_eq!(set.columns, vec!["id", "total"]);
        assert!(set.rows.is_empty());
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let (dir, profile) = fixture();
        let mut session = driver(&dir).connect(&profile, Duration::from_secs(5)).await.unwrap();
        let err = session.query("DELETE FROM orders").await.unwrap_err();
        assert!(matches!(err, ExecutionFailure::Sql(_)));
        assert_eq!(session.query("SELECT * FROM orders").await.unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_database_missing() {
        let (dir, mut profile) = fixture();
        profile.database = dir.path().join("absent.db").to_string_lossy().into_owned();

        let err = match driver(&dir).connect(&profile, Duration::from_secs(5)).await {
            Err(e) => e,
            Ok(_) => panic!("expected connect failure"),
        };
        assert!(matches!(
            err,
            ExecutionFailure::Connection(ConnectionFailureKind::DatabaseMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_long_query_is_interrupted() {
        let (dir, profile) = fixture();
        let mut session = driver(&dir).connect(&profile, Duration::from_millis(200)).await.unwrap();

        let endless = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT MAX(x) FROM c";
        let err = session.query(endless).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_ping() {
        let (dir, profile) = fixture();
        let mut session = driver(&dir).connect(&profile, Duration::from_secs(5)).await.unwrap();
        assert!(session.ping().await.is_ok());
    }

    // ===== Path Confinement =====

    #[tokio::test]
    async fn test_relative_path_resolves_inside_data_dir() {
        let (dir, mut profile) = fixture();
        profile.database = "shop.db".into();
        let mut session = driver(&dir).connect(&profile, Duration::from_secs(5)).await.unwrap();
        assert_eq!(session.query("SELECT id FROM orders").await.unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_file_outside_data_dir_is_refused() {
        let (_shop_dir, profile) = fixture();
        let other = TempDir::new().unwrap();

        let err = refused(&SqliteDriver::new(other.path()), &profile).await;
        assert!(matches!(
            err,
            ExecutionFailure::Connection(ConnectionFailureKind::PathNotAllowed { .. })
        ));
        assert!(err.to_string().contains("outside the permitted data directory"));
    }

    #[tokio::test]
    async fn test_parent_traversal_is_refused() {
        let (dir, mut profile) = fixture();
        let nested = dir.path().join("data");
        std::fs::create_dir(&nested).unwrap();
        profile.database = "../shop.db".into();

        let err = refused(&SqliteDriver::new(&nested), &profile).await;
        assert!(matches!(
            err,
            ExecutionFailure::Connection(ConnectionFailureKind::PathNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn test_blocked_file_is_refused_inside_data_dir() {
        let (dir, profile) = fixture();
        let blocked = driver(&dir).with_blocked_path(dir.path().join("shop.db"));

        let err = refused(&blocked, &profile).await;
        assert!(matches!(
            err,
            ExecutionFailure::Connection(ConnectionFailureKind::PathNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_data_dir_refuses_everything() {
        let (dir, profile) = fixture();
        let err = refused(&SqliteDriver::new(dir.path().join("nowhere")), &profile).await;
        assert!(matches!(
            err,
            ExecutionFailure::Connection(ConnectionFailureKind::PathNotAllowed { .. })
        ));
    }
}
