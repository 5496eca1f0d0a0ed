//! In-memory catalog store for testing.
//!
//! Provides [`MemoryCatalog`], a simple thread-safe implementation of the
//! [`CatalogStore`] trait suitable for tests and development.
//!
//! Not suitable for production: no durability, single-process only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use veld_core::{Error, Result};

use crate::entry::CatalogEntry;
use crate::store::CatalogStore;

/// In-memory catalog store.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    // instance id -> lowercased name -> entry
    state: RwLock<HashMap<String, BTreeMap<String, CatalogEntry>>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("catalog lock poisoned")
}

impl MemoryCatalog {
    /// Creates an empty in-memory catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn path_conflict(entries: &BTreeMap<String, CatalogEntry>, entry: &CatalogEntry) -> bool {
    !entry.path.is_empty()
        && entries
            .values()
            .any(|e| e.path == entry.path && e.lower_name() != entry.lower_name())
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_entry(&self, instance_id: &str, name: &str) -> Result<Option<CatalogEntry>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(instance_id)
            .and_then(|entries| entries.get(&name.to_lowercase()))
            .cloned())
    }

    async fn create_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let entries = state.entry(instance_id.to_string()).or_default();

        if entries.contains_key(&entry.lower_name()) {
            return Err(Error::conflict(format!(
                "catalog entry '{}' already exists",
                entry.name
            )));
        }
        if path_conflict(entries, entry) {
            return Err(Error::conflict(format!(
                "path '{}' is already claimed by another entry",
                entry.path
            )));
        }

        entries.insert(entry.lower_name(), entry.clone());
        Ok(())
    }

    async fn update_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let entries = state.entry(instance_id.to_string()).or_default();

        let existing = entries
            .get(&entry.lower_name())
            .ok_or_else(|| Error::not_found("catalog entry", &entry.name))?;
        if existing.object_type() != entry.object_type() {
            return Err(Error::conflict(format!(
                "cannot change type of '{}' from {} to {}; drop and re-add instead",
                entry.name,
                existing.object_type(),
                entry.object_type()
            )));
        }
        if path_conflict(entries, entry) {
            return Err(Error::conflict(format!(
                "path '{}' is already claimed by another entry",
                entry.path
            )));
        }

        entries.insert(entry.lower_name(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, instance_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let removed = state
            .get_mut(instance_id)
            .and_then(|entries| entries.remove(&name.to_lowercase()));
        if removed.is_none() {
            return Err(Error::not_found("catalog entry", name));
        }
        Ok(())
    }

    async fn list_entries(&self, instance_id: &str) -> Result<Vec<CatalogEntry>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(instance_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }
}
