//! Artifact codecs: repository bytes to catalog objects and back.
//!
//! Sources and metrics views are YAML documents; models are plain SQL
//! files. Parse failures are entry-scoped validation errors carrying the
//! repository path, so one malformed artifact never aborts a whole
//! reconciliation pass.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use veld_catalog::{
    CatalogEntry, CatalogObject, Dimension, Measure, MetricsView, Model, Source,
};
use veld_core::{artifact_path, classify_path, ArtifactKind, Error, RepoStore, Result};

/// Content fingerprint of an artifact blob (sha256, lowercase hex).
#[must_use]
pub fn fingerprint(blob: &[u8]) -> String {
    hex::encode(Sha256::digest(blob))
}

/// Source YAML layout: a `type` key naming the connector, every other key a
/// connector property.
#[derive(Debug, Serialize, Deserialize)]
struct SourceArtifact {
    #[serde(rename = "type")]
    connector: String,
    #[serde(flatten)]
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricsViewArtifact {
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    measures: Vec<Measure>,
}

fn parse_error(path: &str, detail: impl std::fmt::Display) -> Error {
    Error::validation(format!("parsing {path}: {detail}"))
}

fn parse_source(path: &str, blob: &[u8]) -> Result<Source> {
    let artifact: SourceArtifact =
        serde_yaml::from_slice(blob).map_err(|e| parse_error(path, e))?;
    if artifact.connector.is_empty() {
        return Err(parse_error(path, "source declares no connector type"));
    }
    Ok(Source {
        connector: artifact.connector,
        properties: artifact.properties,
    })
}

fn parse_model(path: &str, blob: &[u8]) -> Result<Model> {
    let sql = std::str::from_utf8(blob)
        .map_err(|_| parse_error(path, "model SQL is not valid UTF-8"))?
        .trim()
        .to_string();
    if sql.is_empty() {
        return Err(parse_error(path, "model SQL is empty"));
    }
    Ok(Model {
        sql,
        dialect: "duckdb".to_string(),
    })
}

fn parse_metrics_view(path: &str, blob: &[u8]) -> Result<MetricsView> {
    let artifact: MetricsViewArtifact =
        serde_yaml::from_slice(blob).map_err(|e| parse_error(path, e))?;
    if artifact.model.is_empty() {
        return Err(parse_error(path, "metrics view declares no model"));
    }
    if artifact.measures.is_empty() {
        return Err(parse_error(path, "metrics view declares no measures"));
    }
    for (i, measure) in artifact.measures.iter().enumerate() {
        if measure.name.is_empty() || measure.expression.is_empty() {
            return Err(parse_error(path, format!("measure {i} is incomplete")));
        }
        if artifact.measures[..i].iter().any(|m| m.name == measure.name) {
            return Err(parse_error(
                path,
                format!("duplicate measure name '{}'", measure.name),
            ));
        }
    }
    for (i, dimension) in artifact.dimensions.iter().enumerate() {
        if dimension.name.is_empty() {
            return Err(parse_error(path, format!("dimension {i} has no name")));
        }
        if artifact.dimensions[..i].iter().any(|d| d.name == dimension.name) {
            return Err(parse_error(
                path,
                format!("duplicate dimension name '{}'", dimension.name),
            ));
        }
    }
    Ok(MetricsView {
        model: artifact.model,
        time_dimension: artifact.time_dimension,
        dimensions: artifact.dimensions,
        measures: artifact.measures,
    })
}

/// Decodes a repository artifact into a catalog object.
///
/// # Errors
///
/// Returns [`Error::Validation`] for paths outside the artifact namespace
/// convention and for malformed artifact content.
pub fn decode(path: &str, blob: &[u8]) -> Result<(String, CatalogObject)> {
    let Some((kind, name)) = classify_path(path) else {
        return Err(Error::validation(format!(
            "path is not a recognized artifact: {path}"
        )));
    };
    let object = match kind {
        ArtifactKind::Source => CatalogObject::Source(parse_source(path, blob)?),
        ArtifactKind::Model => CatalogObject::Model(parse_model(path, blob)?),
        ArtifactKind::MetricsView => {
            CatalogObject::MetricsView(parse_metrics_view(path, blob)?)
        }
    };
    Ok((name, object))
}

/// Encodes a catalog object into artifact bytes.
///
/// # Errors
///
/// Returns [`Error::Validation`] for object types with no artifact form
/// (engine-discovered tables).
pub fn encode(object: &CatalogObject) -> Result<Bytes> {
    match object {
        CatalogObject::Source(source) => {
            let artifact = SourceArtifact {
                connector: source.connector.clone(),
                properties: source.properties.clone(),
            };
            let yaml = serde_yaml::to_string(&artifact)
                .map_err(|e| Error::serialization(e.to_string()))?;
            Ok(Bytes::from(yaml))
        }
        CatalogObject::Model(model) => Ok(Bytes::from(model.sql.clone())),
        CatalogObject::MetricsView(view) => {
            let artifact = MetricsViewArtifact {
                model: view.model.clone(),
                time_dimension: view.time_dimension.clone(),
                dimensions: view.dimensions.clone(),
                measures: view.measures.clone(),
            };
            let yaml = serde_yaml::to_string(&artifact)
                .map_err(|e| Error::serialization(e.to_string()))?;
            Ok(Bytes::from(yaml))
        }
        CatalogObject::Table => Err(Error::validation(
            "engine-discovered tables have no artifact form",
        )),
    }
}

/// Reads and decodes one artifact into a fresh catalog entry.
///
/// The entry carries the blob's content fingerprint; schema and refresh
/// timestamp stay unset until materialization.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the artifact does not exist and
/// [`Error::Validation`] if it fails to decode.
pub async fn read_entry(
    repo: &dyn RepoStore,
    instance_id: &str,
    path: &str,
) -> Result<CatalogEntry> {
    let blob = repo.get(instance_id, path).await?;
    let (name, object) = decode(path, &blob)?;
    let mut entry = CatalogEntry::new(name, path, object);
    entry.fingerprint = fingerprint(&blob);
    Ok(entry)
}

/// Encodes a catalog entry and writes it to its conventional repository
/// path. Returns the path written.
///
/// # Errors
///
/// Returns [`Error::Validation`] for entries with no artifact form and
/// [`Error::Storage`] if the write fails.
pub async fn write_entry(
    repo: &dyn RepoStore,
    instance_id: &str,
    entry: &CatalogEntry,
) -> Result<String> {
    let kind = match entry.object {
        CatalogObject::Source(_) => ArtifactKind::Source,
        CatalogObject::Model(_) => ArtifactKind::Model,
        CatalogObject::MetricsView(_) => ArtifactKind::MetricsView,
        CatalogObject::Table => {
            return Err(Error::validation(
                "engine-discovered tables have no artifact form",
            ));
        }
    };
    let path = artifact_path(kind, &entry.name);
    let blob = encode(&entry.object)?;
    repo.put(instance_id, &path, blob).await?;
    Ok(path)
}
