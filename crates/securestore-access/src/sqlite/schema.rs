//! SQLite schema definitions

use crate::error::AccessResult;
use rusqlite::Connection;

pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema
///
/// Also enables foreign keys, which SQLite tracks per connection.
pub fn init_schema(conn: &Connection) -> AccessResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS capability_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_key TEXT NOT NULL UNIQUE,
            bucket_id TEXT NOT NULL,
            object_id TEXT NOT NULL,
            expires_at INTEGER,                    -- Unix millis, NULL = never
            usage_limit INTEGER,                   -- NULL = unlimited
            used_times INTEGER NOT NULL DEFAULT 0,
            resolve_by_url_key INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_keys_expires
            ON capability_keys(expires_at);

        -- One row per accepted 64-byte secret digest
        CREATE TABLE IF NOT EXISTS secret_digests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_id INTEGER NOT NULL
                REFERENCES capability_keys(id) ON DELETE CASCADE,
            digest BLOB NOT NULL,
            UNIQUE(key_id, digest)
        );
    "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Check schema version
pub fn check_version(conn: &Connection) -> AccessResult<u32> {
    let version: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}
