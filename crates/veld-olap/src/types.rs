//! Statement and result types for the OLAP engine boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use veld_core::Schema;

/// A statement submitted to an OLAP engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Query text.
    pub query: String,
    /// Bound parameters, substituted for `?` placeholders in order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Validate without materializing results.
    #[serde(default)]
    pub dry_run: bool,
    /// Priority used when the execution competes for a pooled connection.
    /// Higher is more urgent; only orders contention, never correctness.
    #[serde(default)]
    pub priority: i32,
}

impl Statement {
    /// Creates a statement with no arguments at priority zero.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
            dry_run: false,
            priority: 0,
        }
    }

    /// Sets the bound parameters.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Marks the statement as a dry run.
    #[must_use]
    pub fn as_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Sets the contention priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A table known to the engine's information schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table or view name.
    pub name: String,
    /// Discovered column list.
    pub schema: Schema,
}

/// Result rows from a statement execution.
///
/// Dry runs and DDL produce an empty result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Row values, one `Vec` per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// An empty result (DDL, dry run).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
