//! SQLite-backed implementation of [`CatalogStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Object payloads and
//! schemas are stored as JSON columns; the name and path uniqueness
//! invariants are enforced by the table's primary key and a partial unique
//! index (see [`crate::migrations`]).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use veld_core::{Error, Result};

use crate::entry::CatalogEntry;
use crate::migrations;
use crate::store::CatalogStore;

/// SQLite-backed catalog store.
///
/// Create with [`SqliteCatalog::open`] for file-backed persistence or
/// [`SqliteCatalog::in_memory`] for tests.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Opens or creates a catalog database at `path` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database can't be opened or
    /// migrated.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::storage_with_source("creating catalog directory", e)
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::storage_with_source("opening catalog database", e))?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory catalog database (tests).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database can't be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage_with_source("opening in-memory catalog", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the `(current, desired)` migration versions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the version table cannot be read.
    pub fn migration_status(&self) -> Result<(i64, i64)> {
        let conn = self.lock()?;
        migrations::migration_status(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("catalog lock poisoned"))
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn write_err(context: &str, e: rusqlite::Error) -> Error {
    if is_constraint_violation(&e) {
        Error::conflict(format!("{context}: name or path already in use"))
    } else {
        Error::storage_with_source(context.to_string(), e)
    }
}

fn read_err(context: &str, e: rusqlite::Error) -> Error {
    Error::storage_with_source(context.to_string(), e)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::serialization(format!("invalid catalog timestamp '{raw}': {e}")))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, String, String, String, Option<String>)> {
    Ok((
        row.get("name")?,
        row.get("path")?,
        row.get("object")?,
        row.get("schema")?,
        row.get("fingerprint")?,
        row.get("created_on")?,
        row.get("updated_on")?,
        row.get("refreshed_on")?,
    ))
}

fn decode_entry(
    (name, path, object, schema, fingerprint, created_on, updated_on, refreshed_on): (
        String,
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        Option<String>,
    ),
) -> Result<CatalogEntry> {
    Ok(CatalogEntry {
        name,
        path,
        object: serde_json::from_str(&object).map_err(Error::serialization)?,
        schema: schema
            .map(|s| serde_json::from_str(&s).map_err(Error::serialization))
            .transpose()?,
        fingerprint,
        created_on: parse_timestamp(&created_on)?,
        updated_on: parse_timestamp(&updated_on)?,
        refreshed_on: refreshed_on.map(|s| parse_timestamp(&s)).transpose()?,
    })
}

fn encode_payload(entry: &CatalogEntry) -> Result<(String, Option<String>)> {
    let object = serde_json::to_string(&entry.object).map_err(Error::serialization)?;
    let schema = entry
        .schema
        .as_ref()
        .map(|s| serde_json::to_string(s).map_err(Error::serialization))
        .transpose()?;
    Ok((object, schema))
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn find_entry(&self, instance_id: &str, name: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT name, path, object, schema, fingerprint, created_on, updated_on, refreshed_on
                 FROM catalog_entries WHERE instance_id = ?1 AND lower_name = ?2",
                params![instance_id, name.to_lowercase()],
                entry_from_row,
            )
            .optional()
            .map_err(|e| read_err("finding catalog entry", e))?;
        row.map(decode_entry).transpose()
    }

    async fn create_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()> {
        let (object, schema) = encode_payload(entry)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO catalog_entries
                 (instance_id, name, lower_name, path, object_type, object, schema,
                  fingerprint, created_on, updated_on, refreshed_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                instance_id,
                entry.name,
                entry.lower_name(),
                entry.path,
                entry.object_type().to_string(),
                object,
                schema,
                entry.fingerprint,
                entry.created_on.to_rfc3339(),
                entry.updated_on.to_rfc3339(),
                entry.refreshed_on.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| write_err("creating catalog entry", e))?;
        Ok(())
    }

    async fn update_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()> {
        let (object, schema) = encode_payload(entry)?;
        let conn = self.lock()?;

        let existing_type: Option<String> = conn
            .query_row(
                "SELECT object_type FROM catalog_entries
                 WHERE instance_id = ?1 AND lower_name = ?2",
                params![instance_id, entry.lower_name()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| read_err("finding catalog entry", e))?;
        let existing_type =
            existing_type.ok_or_else(|| Error::not_found("catalog entry", &entry.name))?;
        if existing_type != entry.object_type().to_string() {
            return Err(Error::conflict(format!(
                "cannot change type of '{}' from {} to {}; drop and re-add instead",
                entry.name,
                existing_type,
                entry.object_type()
            )));
        }

        conn.execute(
            "UPDATE catalog_entries
             SET name = ?3, path = ?4, object = ?5, schema = ?6, fingerprint = ?7,
                 created_on = ?8, updated_on = ?9, refreshed_on = ?10
             WHERE instance_id = ?1 AND lower_name = ?2",
            params![
                instance_id,
                entry.lower_name(),
                entry.name,
                entry.path,
                object,
                schema,
                entry.fingerprint,
                entry.created_on.to_rfc3339(),
                entry.updated_on.to_rfc3339(),
                entry.refreshed_on.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| write_err("updating catalog entry", e))?;
        Ok(())
    }

    async fn delete_entry(&self, instance_id: &str, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM catalog_entries WHERE instance_id = ?1 AND lower_name = ?2",
                params![instance_id, name.to_lowercase()],
            )
            .map_err(|e| write_err("deleting catalog entry", e))?;
        if deleted == 0 {
            return Err(Error::not_found("catalog entry", name));
        }
        Ok(())
    }

    async fn list_entries(&self, instance_id: &str) -> Result<Vec<CatalogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, path, object, schema, fingerprint, created_on, updated_on, refreshed_on
                 FROM catalog_entries WHERE instance_id = ?1 ORDER BY lower_name",
            )
            .map_err(|e| read_err("listing catalog entries", e))?;
        let rows = stmt
            .query_map(params![instance_id], entry_from_row)
            .map_err(|e| read_err("listing catalog entries", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| read_err("listing catalog entries", e))?;
            entries.push(decode_entry(raw)?);
        }
        Ok(entries)
    }
}
