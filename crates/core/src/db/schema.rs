//! Journal schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial schema",
        r#"
        CREATE TABLE IF NOT EXISTS resolutions (
            id               TEXT PRIMARY KEY,
            dataset_id       TEXT    NOT NULL,
            dataset_type     TEXT    NOT NULL,
            directive        TEXT    NOT NULL CHECK (directive IN ('keep_local', 'keep_remote', 'merged')),
            merged_payload   TEXT,
            overwrite_local  INTEGER NOT NULL CHECK (overwrite_local IN (0, 1)),
            overwrite_remote INTEGER NOT NULL CHECK (overwrite_remote IN (0, 1)),
            resolved_at      TEXT    NOT NULL,
            CHECK (overwrite_local + overwrite_remote = 1)
        );

        CREATE INDEX IF NOT EXISTS idx_resolutions_dataset ON resolutions (dataset_id);

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            dataset_id  TEXT,
            details     TEXT,
            created_at  TEXT NOT NULL,
            success     INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking journal migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
