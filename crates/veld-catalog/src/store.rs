//! Catalog store contract.
//!
//! The catalog store persists [`CatalogEntry`] records keyed by
//! `(instance, name)`. Implementations must serialize concurrent writes to
//! the same entry name (last-writer-wins per name is acceptable); writes to
//! different names are independent.

use async_trait::async_trait;

use veld_core::Result;

use crate::entry::CatalogEntry;

/// Persisted table of catalog entries keyed by `(instance, name)`.
///
/// Invariants enforced by every implementation:
///
/// - exactly one live entry per name within an instance, with names compared
///   case-insensitively;
/// - `path` is unique among entries that have one;
/// - an entry's object type is immutable across updates; a type change must
///   be performed as delete + create.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Finds an entry by name (case-insensitive).
    ///
    /// Returns `Ok(None)` when no entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::Storage`] if the lookup fails.
    async fn find_entry(&self, instance_id: &str, name: &str) -> Result<Option<CatalogEntry>>;

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::Conflict`] if an entry with the same name
    /// (case-insensitive) or the same non-empty path already exists.
    async fn create_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()>;

    /// Replaces an existing entry, matched by name.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::NotFound`] if the entry does not exist,
    /// or [`veld_core::Error::Conflict`] if the update would change the
    /// entry's object type or claim another entry's path.
    async fn update_entry(&self, instance_id: &str, entry: &CatalogEntry) -> Result<()>;

    /// Deletes an entry by name.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::NotFound`] if the entry does not exist.
    async fn delete_entry(&self, instance_id: &str, name: &str) -> Result<()>;

    /// Lists all entries for an instance, ordered by lowercased name for
    /// deterministic iteration.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::Storage`] if the listing fails.
    async fn list_entries(&self, instance_id: &str) -> Result<Vec<CatalogEntry>>;
}
