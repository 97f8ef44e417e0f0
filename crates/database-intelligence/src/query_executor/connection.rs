//! Dialect resolution and connection failure classification

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::PipelineError;
use crate::schema_index::ConnectionProfile;

/// Independent of the statement timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Unknown names are a configuration error, never a fallback.
    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        match name.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(PipelineError::UnsupportedDialect(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a connection could not be established, with the details needed for the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFailureKind {
    MissingRole { username: String },
    BadPassword { username: String },
    ConnectionRefused { host: String, port: u16 },
    DatabaseMissing { database: String },
    PathNotAllowed { path: String },
    Other(String),
}

impl fmt::Display for ConnectionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionFailureKind::MissingRole { username } => write!(
                f,
                "Database role \"{}\" does not exist. Check the username configured for this database.",
                username
            ),
            ConnectionFailureKind::BadPassword { username } => write!(
                f,
                "Authentication failed for user \"{}\". Check the password configured for this database.",
                username
            ),
            ConnectionFailureKind::ConnectionRefused { host, port } => write!(
                f,
                "Could not connect to {}:{}. Is the database server running and reachable?",
                host, port
            ),
            ConnectionFailureKind::DatabaseMissing { database } => {
                write!(f, "Database \"{}\" does not exist on the server.", database)
            }
            ConnectionFailureKind::PathNotAllowed { path } => write!(
                f,
                "Database file \"{}\" is outside the permitted data directory.",
                path
            ),
            ConnectionFailureKind::Other(detail) => write!(f, "Database connection error: {}", detail),
        }
    }
}

/// A failed execution, already phrased for the end user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("Query timeout: Query took longer than {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("SQL execution error: {0}")]
    Sql(String),

    #[error("{0}")]
    Connection(ConnectionFailureKind),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ExecutionFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionFailure::Timeout { .. })
    }
}

/// Classifies a connect-time failure from its SQLSTATE (if any) and driver message.
pub fn classify_connect_failure(
    profile: &ConnectionProfile,
    sqlstate: Option<&str>,
    message: &str,
) -> ConnectionFailureKind {
    let lower = message.to_lowercase();

    match sqlstate {
        Some("28P01") => {
            return ConnectionFailureKind::BadPassword {
                username: profile.username.clone(),
            }
        }
        Some("3D000") => {
            return ConnectionFailureKind::DatabaseMissing {
                database: profile.database.clone(),
            }
        }
        Some("28000") if lower.contains("role") && lower.contains("does not exist") => {
            return ConnectionFailureKind::MissingRole {
                username: profile.username.clone(),
            }
        }
        _ => {}
    }

    if lower.contains("role") && lower.contains("does not exist") {
        ConnectionFailureKind::MissingRole {
            username: profile.username.clone(),
        }
    } else if lower.contains("password authentication failed") || lower.contains("access denied for user") {
        ConnectionFailureKind::BadPassword {
            username: profile.username.clone(),
        }
    } else if lower.contains("unknown database")
        || (lower.contains("database") && lower.contains("does not exist"))
        || lower.contains("unable to open database file")
    {
        ConnectionFailureKind::DatabaseMissing {
            database: profile.database.clone(),
        }
    } else if lower.contains("connection refused") {
        ConnectionFailureKind::ConnectionRefused {
            host: profile.host.clone(),
            port: profile.port,
        }
    } else {
        ConnectionFailureKind::Other(message.to_string())
    }
}

/// Requested timeout clamped to `1..=max`; missing or non-positive means `default`.
pub fn effective_timeout(requested: Option<i64>, default_seconds: u64, max_seconds: u64) -> u64 {
    match requested {
        Some(seconds) if seconds > 0 => (seconds as u64).min(max_seconds),
        _ => default_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            id: 1,
            name: "shop".into(),
            dialect: "postgres".into(),
            host: "db.local".into(),
            port: 5432,
            database: "shop".into(),
            username: "reader".into(),
            password: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ===== Dialect Tests =====

    #[test]
    fn test_dialect_parse() {
        assert_eq!(Dialect::parse("PostgreSQL").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::parse("postgres").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::parse("mysql").unwrap(), Dialect::MySql);
        assert_eq!(Dialect::parse("sqlite").unwrap(), Dialect::Sqlite);

        let err = Dialect::parse("oracle").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported database type: oracle");
    }

    // ===== Timeout Tests =====

    #[test]
    fn test_effective_timeout() {
        assert_eq!(effective_timeout(None, 30, 300), 30);
        assert_eq!(effective_timeout(Some(0), 30, 300), 30);
        assert_eq!(effective_timeout(Some(-5), 30, 300), 30);
        assert_eq!(effective_timeout(Some(1), 30, 300), 1);
        assert_eq!(effective_timeout(Some(500), 30, 300), 300);
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            ExecutionFailure::Timeout { seconds: 30 }.to_string(),
            "Query timeout: Query took longer than 30 seconds"
        );
    }

    // ===== Classification Tests =====

    #[test]
    fn test_classify_by_sqlstate() {
        let p = profile();
        assert_eq!(
            classify_connect_failure(&p, Some("28P01"), "password authentication failed for user \"reader\""),
            ConnectionFailureKind::BadPassword { username: "reader".into() }
        );
        assert_eq!(
            classify_connect_failure(&p, Some("3D000"), "database \"shop\" does not exist"),
            ConnectionFailureKind::DatabaseMissing { database: "shop".into() }
        );
        assert_eq!(
            classify_connect_failure(&p, Some("28000"), "role \"reader\" does not exist"),
            ConnectionFailureKind::MissingRole { username: "reader".into() }
        );
    }

    #[test]
    fn test_classify_by_message() {
        let p = profile();
        assert_eq!(
            classify_connect_failure(&p, None, "Connection refused (os error 111)"),
            ConnectionFailureKind::ConnectionRefused { host: "db.local".into(), port: 5432 }
        );
        assert_eq!(
            classify_connect_failure(&p, Some("28000"), "Access denied for user 'reader'@'10.0.0.1'"),
            ConnectionFailureKind::BadPassword { username: "reader".into() }
        );
        assert_eq!(
            classify_connect_failure(&p, Some("42000"), "Unknown database 'shop'"),
            ConnectionFailureKind::DatabaseMissing { database: "shop".into() }
        );
        assert!(matches!(
            classify_connect_failure(&p, None, "tls handshake eof"),
            ConnectionFailureKind::Other(_)
        ));
    }

    #[test]
    fn test_connection_messages() {
        assert_eq!(
            ExecutionFailure::Connection(ConnectionFailureKind::MissingRole { username: "bob".into() }).to_string(),
            "Database role \"bob\" does not exist. Check the username configured for this database."
        );
        assert_eq!(
            ConnectionFailureKind::ConnectionRefused { host: "h".into(), port: 1 }.to_string(),
            "Could not connect to h:1. Is the database server running and reachable?"
        );
        assert_eq!(
            ConnectionFailureKind::Other("x".into()).to_string(),
            "Database connection error: x"
        );
    }
}
