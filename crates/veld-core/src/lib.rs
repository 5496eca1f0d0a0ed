//! # veld-core
//!
//! Core abstractions for the Veld analytics runtime.
//!
//! This crate provides the foundational types and traits used across all
//! Veld components:
//!
//! - **Error Types**: The shared error taxonomy and result alias
//! - **Artifact Repository**: The `path -> bytes` store of declarative
//!   artifact definitions, with in-memory and filesystem backends
//! - **Schema Primitives**: Ordered column lists discovered from engines
//! - **Observability**: Structured logging initialization
//!
//! ## Crate Boundary
//!
//! `veld-core` is the only crate allowed to define shared primitives. The
//! catalog, OLAP boundary, and reconciliation service all build on the
//! contracts defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;
pub mod repo;
pub mod schema;

pub use error::{Error, Result};
pub use repo::{artifact_path, classify_path, ArtifactKind, FsRepo, MemoryRepo, ObjectMeta, RepoStore};
pub use schema::{Field, Schema};
