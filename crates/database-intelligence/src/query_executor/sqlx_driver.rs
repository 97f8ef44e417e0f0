//! Postgres and MySQL sessions over single, non-pooled sqlx connections

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row};
use std::time::Duration;
use tracing::{debug, warn};

use super::connection::{
    classify_connect_failure, ConnectionFailureKind, ExecutionFailure, CONNECT_TIMEOUT,
};
use super::value::{mysql_row_to_json, pg_row_to_json};
use super::{DriverSession, QueryDriver, RowSet};
use crate::schema_index::ConnectionProfile;

/// Maps a connect-phase sqlx error to a user-facing connection failure.
fn connect_failure(profile: &ConnectionProfile, err: sqlx::Error) -> ExecutionFailure {
    let kind = match &err {
        sqlx::Error::Database(db_err) => {
            classify_connect_failure(profile, db_err.code().as_deref(), db_err.message())
        }
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            ConnectionFailureKind::ConnectionRefused {
                host: profile.host.clone(),
                port: profile.port,
            }
        }
        other => classify_connect_failure(profile, None, &other.to_string()),
    };
    ExecutionFailure::Connection(kind)
}

/// Maps a query-phase sqlx error, recognising server-side statement timeouts.
fn query_failure(err: sqlx::Error, timeout: Duration) -> ExecutionFailure {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message().to_lowercase();
        // 57014: postgres query_canceled; 3024: mysql max_execution_time exceeded
        if db_err.code().as_deref() == Some("57014")
            || message.contains("statement timeout")
            || message.contains("maximum statement execution time exceeded")
        {
            return ExecutionFailure::Timeout {
                seconds: timeout.as_secs(),
            };
        }
        return ExecutionFailure::Sql(db_err.message().to_string());
    }
    ExecutionFailure::Sql(err.to_string())
}

/// Prepared statements reject trailing terminators on some servers.
fn statement_text(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

async fn connect_within<C, F>(profile: &ConnectionProfile, fut: F) -> Result<C, ExecutionFailure>
where
    F: std::future::Future<Output = Result<C, sqlx::Error>>,
{
    match tokio::time::timeout(CONNECT_TIMEOUT, fut).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(connect_failure(profile, e)),
        Err(_) => Err(ExecutionFailure::Connection(ConnectionFailureKind::Other(format!(
            "timed out connecting to {}:{} after {}s",
            profile.host,
            profile.port,
            CONNECT_TIMEOUT.as_secs()
        )))),
    }
}

// ===== Postgres =====

/// Read-only session with the statement timeout applied server-side.
fn pg_options(profile: &ConnectionProfile, statement_timeout: Duration) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&profile.host)
        .port(profile.port)
        .database(&profile.database)
        .username(&profile.username)
        .options([
            ("default_transaction_read_only", "on".to_string()),
            ("statement_timeout", statement_timeout.as_millis().to_string()),
        ]);
    match profile.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => options.password(password),
        None => options,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDriver;

#[async_trait]
impl QueryDriver for PostgresDriver {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        statement_timeout: Duration,
    ) -> Result<Box<dyn DriverSession>, ExecutionFailure> {
        let options = pg_options(profile, statement_timeout);
        let conn = connect_within(profile, options.connect()).await?;
        debug!("Connected to postgres {}:{}/{}", profile.host, profile.port, profile.database);
        Ok(Box::new(PgSession {
            conn,
            statement_timeout,
        }))
    }
}

struct PgSession {
    conn: PgConnection,
    statement_timeout: Duration,
}

#[async_trait]
impl DriverSession for PgSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet, ExecutionFailure> {
        let sql = statement_text(sql);
        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| query_failure(e, self.statement_timeout))?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => self
                .conn
                .describe(sql)
                .await
                .map_err(|e| query_failure(e, self.statement_timeout))?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        Ok(RowSet {
            columns,
            rows: rows.iter().map(pg_row_to_json).collect(),
        })
    }

    async fn ping(&mut self) -> Result<(), ExecutionFailure> {
        self.conn
            .ping()
            .await
            .map_err(|e| ExecutionFailure::Connection(ConnectionFailureKind::Other(e.to_string())))
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            warn!("Error closing postgres connection: {}", e);
        }
    }
}

// ===== MySQL =====

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDriver;

/// Plain TCP with UTC session time; read-only mode is set after connecting.
fn mysql_options(profile: &ConnectionProfile) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&profile.host)
        .port(profile.port)
        .database(&profile.database)
        .username(&profile.username)
        .ssl_mode(MySqlSslMode::Disabled)
        .timezone(Some("+00:00".to_string()));
    match profile.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => options.password(password),
        None => options,
    }
}

#[async_trait]
impl QueryDriver for MySqlDriver {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        statement_timeout: Duration,
    ) -> Result<Box<dyn DriverSession>, ExecutionFailure> {
        let options = mysql_options(profile);
        let mut conn = connect_within(profile, options.connect()).await?;
        let session_setup = [
            "SET SESSION TRANSACTION READ ONLY".to_string(),
            format!("SET SESSION MAX_EXECUTION_TIME = {}", statement_timeout.as_millis()),
        ];
        for statement in &session_setup {
            if let Err(e) = conn.execute(statement.as_str()).await {
                let _ = conn.close().await;
                return Err(ExecutionFailure::Connection(ConnectionFailureKind::Other(
                    e.to_string(),
                )));
            }
        }

        debug!("Connected to mysql {}:{}/{}", profile.host, profile.port, profile.database);
        Ok(Box::new(MySqlSession {
            conn,
            statement_timeout,
        }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
    statement_timeout: Duration,
}

#[async_trait]
impl DriverSession for MySqlSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet, ExecutionFailure> {
        let sql = statement_text(sql);
        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| query_failure(e, self.statement_timeout))?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => self
                .conn
                .describe(sql)
                .await
                .map_err(|e| query_failure(e, self.statement_timeout))?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        Ok(RowSet {
            columns,
            rows: rows.iter().map(mysql_row_to_json).collect(),
        })
    }

    async fn ping(&mut self) -> Result<(), ExecutionFailure> {
        self.conn
            .ping()
            .await
            .map_err(|e| ExecutionFailure::Connection(ConnectionFailureKind::Other(e.to_string())))
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            warn!("Error closing mysql connection: {}", e);
        }
    }
}
