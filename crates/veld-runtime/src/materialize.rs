//! Engine DDL generation for catalog objects.
//!
//! All statements are create-or-replace so a retried apply converges on the
//! same engine state. Identifiers are quoted, and values that must appear
//! inline (connector file paths in ingest statements) are escaped as SQL
//! string literals; everything user-queryable goes through bound parameters
//! instead (see [`crate::metrics`]).

use veld_catalog::{ObjectType, Source};
use veld_core::{Error, Result};

/// Quotes an identifier for use in engine SQL.
///
/// Wraps in double quotes and doubles any embedded quote, per standard SQL
/// quoting rules.
#[must_use]
pub fn safe_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes a string as a single-quoted SQL literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Returns the engine reader function for a file-backed source path.
fn reader_function(path: &str) -> Result<&'static str> {
    let lower = path.to_lowercase();
    if lower.ends_with(".csv") || lower.ends_with(".tsv") || lower.ends_with(".txt") {
        Ok("read_csv_auto")
    } else if lower.ends_with(".parquet") {
        Ok("read_parquet")
    } else if lower.ends_with(".json") || lower.ends_with(".ndjson") {
        Ok("read_json_auto")
    } else {
        Err(Error::validation(format!(
            "unsupported file extension for source ingestion: {path}"
        )))
    }
}

/// Builds the ingest statement for a source.
///
/// # Errors
///
/// Returns [`Error::Validation`] for an unknown connector or a connector
/// missing its required properties.
pub fn source_ingest_sql(name: &str, source: &Source) -> Result<String> {
    let location = match source.connector.as_str() {
        "local_file" => source.property_string("path").ok_or_else(|| {
            Error::validation(format!("source '{name}' is missing the 'path' property"))
        })?,
        "s3" | "gcs" | "https" => source.property_string("uri").ok_or_else(|| {
            Error::validation(format!("source '{name}' is missing the 'uri' property"))
        })?,
        other => {
            return Err(Error::validation(format!(
                "source '{name}' uses unknown connector '{other}'"
            )));
        }
    };
    let reader = reader_function(location)?;
    Ok(format!(
        "CREATE OR REPLACE TABLE {} AS SELECT * FROM {reader}({})",
        safe_name(name),
        quote_literal(location),
    ))
}

/// Builds the create-or-replace statement for a model.
#[must_use]
pub fn model_view_sql(name: &str, sql: &str) -> String {
    format!("CREATE OR REPLACE VIEW {} AS {sql}", safe_name(name))
}

/// Builds the drop statement for a materialized object.
///
/// Returns `None` for object types with no engine materialization
/// (metrics views are catalog-only).
#[must_use]
pub fn drop_sql(object_type: ObjectType, name: &str) -> Option<String> {
    match object_type {
        ObjectType::Source | ObjectType::Table => {
            Some(format!("DROP TABLE IF EXISTS {}", safe_name(name)))
        }
        ObjectType::Model => Some(format!("DROP VIEW IF EXISTS {}", safe_name(name))),
        ObjectType::MetricsView => None,
    }
}

/// Builds the rename statement used when the rename heuristic matches.
///
/// Returns `None` for object types with no engine materialization.
#[must_use]
pub fn rename_sql(object_type: ObjectType, from: &str, to: &str) -> Option<String> {
    match object_type {
        ObjectType::Source | ObjectType::Table => Some(format!(
            "ALTER TABLE {} RENAME TO {}",
            safe_name(from),
            safe_name(to)
        )),
        ObjectType::Model => Some(format!(
            "ALTER VIEW {} RENAME TO {}",
            safe_name(from),
            safe_name(to)
        )),
        ObjectType::MetricsView => None,
    }
}
