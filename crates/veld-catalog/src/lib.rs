//! # veld-catalog
//!
//! Catalog entry model and persisted catalog stores for the Veld analytics
//! runtime.
//!
//! The catalog is one leg of the three-way consistency problem the
//! reconciliation engine solves: it records, per instance, which objects are
//! known, which artifact each was derived from, and the schema discovered
//! after materialization.
//!
//! Two store backends are provided:
//!
//! - [`MemoryCatalog`] for tests and development
//! - [`SqliteCatalog`] for file-backed persistence, with versioned
//!   migrations applied under an exclusive lock

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod entry;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use entry::{
    CatalogEntry, CatalogObject, Dimension, Measure, MetricsView, Model, ObjectType, Source,
};
pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;
pub use store::CatalogStore;
