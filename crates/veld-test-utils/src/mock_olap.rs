//! In-memory mock OLAP engine.
//!
//! The mock interprets exactly the DDL shapes the reconciler emits
//! (create-or-replace, drop-if-exists, alter-rename with quoted
//! identifiers) against a shared table map, records every statement it
//! sees, and can be primed to fail specific object names so partial-failure
//! paths are testable. Everything else executes as a no-op returning an
//! empty result.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use veld_core::{Error, Field, Result, Schema};
use veld_olap::{OlapHandle, OlapSession, QueryResult, Statement, Table};

#[derive(Debug, Default)]
struct MockState {
    /// Live engine objects, keyed by lowercased name.
    tables: HashMap<String, Schema>,
    /// Schemas to assign when a given object is created.
    planned_schemas: HashMap<String, Schema>,
    /// Every statement executed, in order, dry runs included.
    statements: Vec<Statement>,
    /// Object names whose DDL fails with an engine error.
    fail_names: HashSet<String>,
}

/// Control and inspection handle for the mock engine.
///
/// Cloning is cheap; all clones and all sessions built from
/// [`MockOlap::handle`] share one state.
#[derive(Debug, Clone, Default)]
pub struct MockOlap {
    state: Arc<Mutex<MockState>>,
}

impl MockOlap {
    /// Creates an empty mock engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an [`OlapHandle`] with `pool_size` pooled sessions plus the
    /// metadata session, all sharing this mock's state.
    #[must_use]
    pub fn handle(&self, pool_size: usize) -> Arc<OlapHandle> {
        let sessions: Vec<Arc<dyn OlapSession>> = (0..pool_size)
            .map(|_| {
                Arc::new(MockSession {
                    state: Arc::clone(&self.state),
                }) as Arc<dyn OlapSession>
            })
            .collect();
        let meta = Arc::new(MockSession {
            state: Arc::clone(&self.state),
        });
        Arc::new(OlapHandle::new(sessions, meta))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Inserts a pre-existing engine object with the given schema.
    pub fn prime_table(&self, name: &str, schema: Schema) {
        self.lock().tables.insert(name.to_lowercase(), schema);
    }

    /// Sets the schema an object will receive when the reconciler creates
    /// it. Unprimed objects get a generic two-column schema.
    pub fn prime_schema(&self, name: &str, schema: Schema) {
        self.lock()
            .planned_schemas
            .insert(name.to_lowercase(), schema);
    }

    /// Makes every DDL statement targeting `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.lock().fail_names.insert(name.to_lowercase());
    }

    /// Returns all executed statements, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// Returns true if the engine holds an object with this name.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(&name.to_lowercase())
    }

    /// Returns the names of all live engine objects, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().tables.keys().cloned().collect();
        names.sort();
        names
    }
}

fn default_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", "BIGINT"),
        Field::new("value", "DOUBLE"),
    ])
}

/// Parses a leading double-quoted identifier, returning it and the rest.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let rest = input.strip_prefix('"')?;
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                chars.next();
                name.push('"');
            } else {
                return Some((name, &rest[i + 1..]));
            }
        } else {
            name.push(c);
        }
    }
    None
}

fn target_after<'a>(query: &'a str, prefix: &str) -> Option<(String, &'a str)> {
    parse_quoted(query.strip_prefix(prefix)?)
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl OlapSession for MockSession {
    async fn execute(&self, stmt: &Statement) -> Result<QueryResult> {
        let mut state = self.lock();
        state.statements.push(stmt.clone());
        let query = stmt.query.as_str();

        let mutation = target_after(query, "CREATE OR REPLACE TABLE ")
            .or_else(|| target_after(query, "CREATE OR REPLACE VIEW "))
            .map(|(name, _)| (name, Mutation::Create))
            .or_else(|| {
                target_after(query, "DROP TABLE IF EXISTS ")
                    .or_else(|| target_after(query, "DROP VIEW IF EXISTS "))
                    .map(|(name, _)| (name, Mutation::Drop))
            })
            .or_else(|| {
                target_after(query, "ALTER TABLE ")
                    .or_else(|| target_after(query, "ALTER VIEW "))
                    .and_then(|(from, rest)| {
                        let (to, _) = target_after(rest, " RENAME TO ")?;
                        Some((from, Mutation::Rename { to }))
                    })
            });

        let Some((name, mutation)) = mutation else {
            // SELECT probes and anything unrecognized succeed as no-ops.
            return Ok(QueryResult::empty());
        };

        let lower = name.to_lowercase();
        if state.fail_names.contains(&lower) {
            return Err(Error::engine(format!("statement rejected for '{name}'")));
        }
        if stmt.dry_run {
            return Ok(QueryResult::empty());
        }
        match mutation {
            Mutation::Create => {
                let schema = state
                    .planned_schemas
                    .get(&lower)
                    .cloned()
                    .unwrap_or_else(default_schema);
                state.tables.insert(lower, schema);
            }
            Mutation::Drop => {
                state.tables.remove(&lower);
            }
            Mutation::Rename { to } => {
                let to_lower = to.to_lowercase();
                if state.fail_names.contains(&to_lower) {
                    return Err(Error::engine(format!("statement rejected for '{to}'")));
                }
                let Some(schema) = state.tables.remove(&lower) else {
                    return Err(Error::engine(format!("no such object '{name}'")));
                };
                state.tables.insert(to_lower, schema);
            }
        }
        Ok(QueryResult::empty())
    }

    async fn lookup_table(&self, name: &str) -> Result<Table> {
        let state = self.lock();
        state
            .tables
            .get(&name.to_lowercase())
            .map(|schema| Table {
                name: name.to_string(),
                schema: schema.clone(),
            })
            .ok_or_else(|| Error::not_found("table", name))
    }

    async fn all_tables(&self) -> Result<Vec<Table>> {
        let state = self.lock();
        let mut tables: Vec<Table> = state
            .tables
            .iter()
            .map(|(name, schema)| Table {
                name: name.clone(),
                schema: schema.clone(),
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }
}

enum Mutation {
    Create,
    Drop,
    Rename { to: String },
}
