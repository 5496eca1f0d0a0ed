//! Catalog entry data model.
//!
//! A [`CatalogEntry`] is the unit of tracked state: the persisted record
//! describing a materialized or pending object. Exactly one live entry
//! exists per name within an instance (names compare case-insensitively),
//! and an entry's object type is immutable across updates; a type change
//! is modeled as drop + add.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use veld_core::Schema;

/// The kind of object a catalog entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectType {
    /// An engine-discovered table with no backing artifact.
    Table,
    /// A source extract.
    Source,
    /// A transform model.
    Model,
    /// A metrics-view definition.
    MetricsView,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Table => "table",
            Self::Source => "source",
            Self::Model => "model",
            Self::MetricsView => "metrics view",
        };
        f.write_str(s)
    }
}

/// A source extract definition: a connector plus connector-specific
/// properties.
///
/// Properties are an open key/value map because each connector declares its
/// own fields; access goes through capability-gated accessors rather than
/// direct map reads so new connectors can evolve their property sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Connector name (e.g. `local_file`).
    pub connector: String,
    /// Connector-specific properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Source {
    /// Returns a string-typed property, if present and a string.
    #[must_use]
    pub fn property_string(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A transform model: SQL text plus its target dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// The model's SELECT statement.
    pub sql: String,
    /// Target dialect name (engine-specific; `duckdb` by default).
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

fn default_dialect() -> String {
    "duckdb".to_string()
}

/// A named measure within a metrics view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    /// Measure name, unique within the view.
    pub name: String,
    /// Aggregate SQL expression (e.g. `sum(revenue)`).
    pub expression: String,
    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A dimension within a metrics view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    /// Dimension name, unique within the view.
    pub name: String,
    /// Backing column in the model (defaults to the dimension name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Dimension {
    /// Returns the backing column for this dimension.
    #[must_use]
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// A metrics-view definition over a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    /// Name of the model this view reads from.
    pub model: String,
    /// Time dimension column; required for time-range queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dimension: Option<String>,
    /// Declared dimensions.
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    /// Declared measures.
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl MetricsView {
    /// Looks up a measure by name.
    #[must_use]
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// Looks up a dimension by name.
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }
}

/// The typed payload of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CatalogObject {
    /// An engine-discovered table; carries no definition.
    Table,
    /// A source extract definition.
    Source(Source),
    /// A transform model.
    Model(Model),
    /// A metrics-view definition.
    MetricsView(MetricsView),
}

impl CatalogObject {
    /// Returns the object type of this payload.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Table => ObjectType::Table,
            Self::Source(_) => ObjectType::Source,
            Self::Model(_) => ObjectType::Model,
            Self::MetricsView(_) => ObjectType::MetricsView,
        }
    }
}

/// The persisted record describing a materialized or pending object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Object name, unique per instance (case-insensitive).
    pub name: String,
    /// Repository path this entry was derived from; empty for
    /// engine-discovered tables with no artifact.
    #[serde(default)]
    pub path: String,
    /// The typed payload.
    pub object: CatalogObject,
    /// Columns discovered after materialization; absent until the first
    /// successful build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    /// Content fingerprint of the backing artifact (sha256 hex); empty for
    /// entries without an artifact.
    #[serde(default)]
    pub fingerprint: String,
    /// When the entry was first created.
    pub created_on: DateTime<Utc>,
    /// When the entry was last updated.
    pub updated_on: DateTime<Utc>,
    /// When the underlying object was last materialized, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_on: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Creates a new entry with creation timestamps set to now.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>, object: CatalogObject) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            path: path.into(),
            object,
            schema: None,
            fingerprint: String::new(),
            created_on: now,
            updated_on: now,
            refreshed_on: None,
        }
    }

    /// Returns the object type of this entry.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Returns the name lowered for case-insensitive comparison.
    #[must_use]
    pub fn lower_name(&self) -> String {
        self.name.to_lowercase()
    }
}
