//! SQLite schema for the descriptor index and the connection-profile registry

use rusqlite::{Connection, Result};
use tracing::{error, info};

/// Ordered `(version, sql)` migrations. Applied versions are recorded in `schema_version`.
pub const MIGRATIONS: &[(i32, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS database_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        dialect TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        database_name TEXT NOT NULL,
        username TEXT NOT NULL,
        password TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS schema_descriptors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        database_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dimension INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(database_id, name)
    );

    CREATE INDEX IF NOT EXISTS idx_schema_descriptors_database
        ON schema_descriptors(database_id);",
)];

/// Creates the version table and applies every pending migration in its own transaction.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for (version, sql) in MIGRATIONS.iter() {
        if *version <= current_version {
            continue;
        }
        info!("Applying index migration {}...", version);
        let tx = conn.transaction()?;
        if let Err(e) = tx.execute_batch(sql) {
            error!("Failed to apply index migration {}: {}", version, e);
            return Err(e);
        }
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }

    Ok(())
}
