//! SQLite schema for settings and document records.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    login_email TEXT UNIQUE NOT NULL,
    login_password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,

    title TEXT NOT NULL,
    description TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',

    original_name TEXT NOT NULL,
    original_path TEXT NOT NULL,
    ip_whitelist TEXT NOT NULL DEFAULT '[]',

    is_signed INTEGER NOT NULL DEFAULT 0 CHECK (is_signed IN (0, 1)),
    signed_name TEXT UNIQUE,
    signed_path TEXT,
    signed_at TEXT,
    signed_by_metadata TEXT,
    signed_by_ip TEXT,
    remarks TEXT,

    deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1)),
    deleted_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    CHECK (
        (is_signed = 0 AND signed_name IS NULL AND signed_path IS NULL AND signed_at IS NULL
            AND signed_by_metadata IS NULL AND signed_by_ip IS NULL AND remarks IS NULL)
        OR
        (is_signed = 1 AND signed_name IS NOT NULL AND signed_path IS NOT NULL AND signed_at IS NOT NULL
            AND signed_by_metadata IS NOT NULL AND signed_by_ip IS NOT NULL AND remarks IS NOT NULL)
    ),
    CHECK ((deleted = 0 AND deleted_at IS NULL) OR (deleted = 1 AND deleted_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_documents_live_created
    ON documents (deleted, created_at DESC);
"#;

/// Create tables on a fresh database and record the schema version.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let current: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match current {
        None => {
            info!("Creating database schema v{}", SCHEMA_VERSION);
            conn.execute_batch(SCHEMA)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(v) => {
            info!("Database schema is at v{}", v);
            conn.execute_batch(SCHEMA)?;
        }
    }
    Ok(())
}
