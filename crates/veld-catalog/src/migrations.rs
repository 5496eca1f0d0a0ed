//! Versioned schema migrations for the SQLite catalog store.
//!
//! A single-row `catalog_migration_version` table tracks the applied schema
//! version. Migrations run in ascending version order inside one exclusive
//! transaction, which is SQLite's equivalent of a global advisory lock: at
//! most one migration run proceeds across all concurrent process instances
//! sharing the database file.

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use veld_core::{Error, Result};

/// Name of the table that tracks the applied schema version.
const VERSION_TABLE: &str = "catalog_migration_version";

/// A single schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Strictly increasing schema version this migration produces.
    pub version: i64,
    /// DDL to apply.
    pub sql: &'static str,
}

/// All known migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "
CREATE TABLE catalog_entries (
    instance_id TEXT NOT NULL,
    name TEXT NOT NULL,
    lower_name TEXT NOT NULL,
    path TEXT NOT NULL DEFAULT '',
    object_type TEXT NOT NULL,
    object TEXT NOT NULL,
    schema TEXT,
    fingerprint TEXT NOT NULL DEFAULT '',
    created_on TEXT NOT NULL,
    updated_on TEXT NOT NULL,
    refreshed_on TEXT,
    PRIMARY KEY (instance_id, lower_name)
);

CREATE UNIQUE INDEX idx_catalog_entries_path
    ON catalog_entries (instance_id, path)
    WHERE path != '';
",
}];

fn sqlite_err(e: rusqlite::Error) -> Error {
    Error::storage_with_source("catalog migration failed", e)
}

/// Applies all pending migrations.
///
/// Safe for concurrent invocation from multiple processes: the exclusive
/// transaction serializes runners, and versions already at or below the
/// recorded one are skipped.
///
/// # Errors
///
/// Returns [`Error::Storage`] if a migration cannot be applied.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Exclusive)
        .map_err(sqlite_err)?;

    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (version INTEGER NOT NULL);
         INSERT INTO {VERSION_TABLE} (version)
             SELECT 0 WHERE 0 = (SELECT count(*) FROM {VERSION_TABLE});"
    ))
    .map_err(sqlite_err)?;

    let current: i64 = tx
        .query_row(&format!("SELECT version FROM {VERSION_TABLE}"), [], |row| {
            row.get(0)
        })
        .map_err(sqlite_err)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tx.execute_batch(migration.sql).map_err(|e| {
            Error::storage_with_source(
                format!("failed to run migration {}", migration.version),
                e,
            )
        })?;
        tx.execute(
            &format!("UPDATE {VERSION_TABLE} SET version = ?1"),
            [migration.version],
        )
        .map_err(sqlite_err)?;
        info!(version = migration.version, "applied catalog migration");
    }

    tx.commit().map_err(sqlite_err)
}

/// Returns the `(current, desired)` schema versions.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the version table cannot be read.
pub fn migration_status(conn: &Connection) -> Result<(i64, i64)> {
    let current: i64 = conn
        .query_row(&format!("SELECT version FROM {VERSION_TABLE}"), [], |row| {
            row.get(0)
        })
        .map_err(sqlite_err)?;
    let desired = MIGRATIONS.last().map_or(0, |m| m.version);
    Ok((current, desired))
}
