//! Table schema primitives shared between the catalog and the OLAP boundary.
//!
//! A [`Schema`] is the ordered column list discovered from an engine's
//! information schema after an object is materialized. Catalog entries carry
//! no schema until their first successful build.

use serde::{Deserialize, Serialize};

/// A single column in a materialized table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Column name as reported by the engine.
    pub name: String,
    /// Engine type name (dialect-specific, e.g. `VARCHAR`, `TIMESTAMP`).
    pub field_type: String,
}

impl Field {
    /// Creates a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Ordered column list for a materialized object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Columns in engine order.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Creates a schema from a field list.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns true if the schema declares a column with the given name.
    ///
    /// Comparison is case-insensitive, matching engine identifier semantics.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_field_is_case_insensitive() {
        let schema = Schema::new(vec![
            Field::new("id", "BIGINT"),
            Field::new("Occurred_At", "TIMESTAMP"),
        ]);
        assert!(schema.has_field("occurred_at"));
        assert!(schema.has_field("ID"));
        assert!(!schema.has_field("missing"));
    }
}
