//! Query executor module - validated, read-only, timeout-bounded execution.
//!
//! One connection per call, closed on every exit path. Drivers are selected by
//! dialect; each turns its native rows into ordered JSON maps.

pub mod connection;
pub mod sqlite_driver;
pub mod sqlx_driver;
pub mod value;

pub use connection::{effective_timeout, ConnectionFailureKind, Dialect, ExecutionFailure};
pub use sqlite_driver::SqliteDriver;
pub use sqlx_driver::{MySqlDriver, PostgresDriver};
pub use value::JsonRow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::metrics;
use crate::progress::{ProgressPublisher, StageReporter, Topic};
use crate::schema_index::ConnectionProfile;
use crate::sql_validator::SqlValidator;

/// Extra time the client-side backstop allows beyond the server statement timeout.
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Column names plus rows keyed by column, in result order.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<JsonRow>,
}

/// Opens sessions for one dialect.
#[async_trait]
pub trait QueryDriver: Send + Sync {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        statement_timeout: Duration,
    ) -> Result<Box<dyn DriverSession>, ExecutionFailure>;
}

/// A single open connection. Callers must `close` it on every path.
#[async_trait]
pub trait DriverSession: Send {
    async fn query(&mut self, sql: &str) -> Result<RowSet, ExecutionFailure>;

    async fn ping(&mut self) -> Result<(), ExecutionFailure>;

    async fn close(self: Box<Self>);
}

/// How an execution ended. Not serialized; drives status codes and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionOutcome {
    #[default]
    Completed,
    Rejected,
    NotFound,
    Timeout,
    Failed,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::Timeout => "timeout",
            _ => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub outcome: ExecutionOutcome,
}

impl QueryResult {
    fn completed(set: RowSet, started: Instant, executed_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            row_count: set.rows.len(),
            columns: set.columns,
            rows: set.rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
            executed_at,
            error_message: None,
            outcome: ExecutionOutcome::Completed,
        }
    }

    pub fn failed(
        outcome: ExecutionOutcome,
        message: impl Into<String>,
        started: Instant,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            execution_time_ms: started.elapsed().as_millis() as u64,
            executed_at,
            error_message: Some(message.into()),
            outcome,
        }
    }
}

pub struct QueryExecutor {
    drivers: HashMap<Dialect, Arc<dyn QueryDriver>>,
    validator: SqlValidator,
    publisher: Arc<dyn ProgressPublisher>,
    default_timeout_seconds: u64,
    max_timeout_seconds: u64,
}

impl QueryExecutor {
    /// Executor with the Postgres and MySQL drivers registered.
    ///
    /// SQLite is opt-in through [`QueryExecutor::with_driver`] with a
    /// [`SqliteDriver`] confined to a data directory.
    pub fn new(publisher: Arc<dyn ProgressPublisher>) -> Self {
        let mut drivers: HashMap<Dialect, Arc<dyn QueryDriver>> = HashMap::new();
        drivers.insert(Dialect::Postgres, Arc::new(PostgresDriver));
        drivers.insert(Dialect::MySql, Arc::new(MySqlDriver));
        Self {
            drivers,
            validator: SqlValidator::new(),
            publisher,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
        }
    }

    pub fn with_driver(mut self, dialect: Dialect, driver: Arc<dyn QueryDriver>) -> Self {
        self.drivers.insert(dialect, driver);
        self
    }

    pub fn with_timeouts(mut self, default_seconds: u64, max_seconds: u64) -> Self {
        self.default_timeout_seconds = default_seconds;
        self.max_timeout_seconds = max_seconds;
        self
    }

    pub fn effective_timeout(&self, requested: Option<i64>) -> u64 {
        effective_timeout(requested, self.default_timeout_seconds, self.max_timeout_seconds)
    }

    fn driver_for(&self, profile: &ConnectionProfile) -> Result<(Dialect, Arc<dyn QueryDriver>), PipelineError> {
        let dialect = Dialect::parse(&profile.dialect)?;
        let driver = self
            .drivers
            .get(&dialect)
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedDialect(profile.dialect.clone()))?;
        Ok((dialect, driver))
    }

    /// Runs `sql` against `profile` and reports every stage on the query-execution topic.
    ///
    /// Never fails: every problem becomes an unsuccessful [`QueryResult`].
    pub async fn execute(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
        timeout_seconds: Option<i64>,
        request_id: &str,
    ) -> QueryResult {
        let reporter = StageReporter::new(self.publisher.clone(), Topic::QueryExecution, request_id);
        let started = Instant::now();
        let executed_at = Utc::now();

        let validation = self.validator.validate(sql);
        if !validation.is_valid {
            let message = PipelineError::Validation(validation.errors.clone()).to_string();
            warn!("request_id={} {}", request_id, message);
            reporter.error("ERROR", message.clone(), Some(json!({ "errors": validation.errors })));
            return self.finish(QueryResult::failed(ExecutionOutcome::Rejected, message, started, executed_at));
        }

        let (dialect, driver) = match self.driver_for(profile) {
            Ok(found) => found,
            Err(e) => {
                reporter.error("ERROR", e.to_string(), None);
                return self.finish(QueryResult::failed(ExecutionOutcome::Failed, e.to_string(), started, executed_at));
            }
        };

        let timeout = self.effective_timeout(timeout_seconds);
        let statement_timeout = Duration::from_secs(timeout);

        reporter.progress(
            "CONNECTING",
            format!("Connecting to {} database", dialect),
            Some(json!({ "databaseId": profile.id, "dialect": dialect.name() })),
        );
        let mut session = match driver.connect(profile, statement_timeout).await {
            Ok(session) => session,
            Err(failure) => {
                warn!("request_id={} connect failed: {}", request_id, failure);
                reporter.error("ERROR", failure.to_string(), None);
                return self.finish(QueryResult::failed(ExecutionOutcome::Failed, failure.to_string(), started, executed_at));
            }
        };

        reporter.progress(
            "EXECUTING",
            "Executing SQL query",
            Some(json!({ "timeoutSeconds": timeout })),
        );
        let outcome = match tokio::time::timeout(statement_timeout + TIMEOUT_GRACE, session.query(sql)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionFailure::Timeout { seconds: timeout }),
        };
        session.close().await;

        let result = match outcome {
            Ok(set) => {
                info!(
                    "request_id={} query returned {} rows in {}ms",
                    request_id,
                    set.rows.len(),
                    started.elapsed().as_millis()
                );
                let result = QueryResult::completed(set, started, executed_at);
                reporter.success(
                    "COMPLETED",
                    "Query executed successfully",
                    Some(json!({
                        "rowCount": result.row_count,
                        "executionTimeMs": result.execution_time_ms
                    })),
                );
                result
            }
            Err(failure) if failure.is_timeout() => {
                warn!("request_id={} {}", request_id, failure);
                reporter.error("TIMEOUT", failure.to_string(), Some(json!({ "timeoutSeconds": timeout })));
                QueryResult::failed(ExecutionOutcome::Timeout, failure.to_string(), started, executed_at)
            }
            Err(failure) => {
                error!("request_id={} {}", request_id, failure);
                reporter.error("ERROR", failure.to_string(), None);
                QueryResult::failed(ExecutionOutcome::Failed, failure.to_string(), started, executed_at)
            }
        };
        self.finish(result)
    }

    fn finish(&self, result: QueryResult) -> QueryResult {
        metrics::observe_query_execution(result.execution_time_ms as f64 / 1000.0);
        result
    }

    /// Opens a connection and pings it within five seconds.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> bool {
        let driver = match self.driver_for(profile) {
            Ok((_, driver)) => driver,
            Err(e) => {
                warn!("Connection test for {} skipped: {}", profile.name, e);
                return false;
            }
        };

        let statement_timeout = Duration::from_secs(self.default_timeout_seconds);
        let mut session = match driver.connect(profile, statement_timeout).await {
            Ok(session) => session,
            Err(e) => {
                info!("Connection test for {} failed: {}", profile.name, e);
                return false;
            }
        };

        let alive = matches!(
            tokio::time::timeout(connection::PING_TIMEOUT, session.ping()).await,
            Ok(Ok(()))
        );
        session.close().await;
        alive
    }
}
