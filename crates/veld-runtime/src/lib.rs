//! # veld-runtime
//!
//! Reconciliation core of the Veld analytics runtime.
//!
//! This crate turns a project's declarative artifacts into live engine and
//! catalog state:
//!
//! - **Artifact Codecs**: YAML/SQL artifact bytes to catalog objects
//! - **Dependency Planning**: Reference extraction from model SQL and
//!   deterministic topological apply ordering
//! - **Reconciliation Engine**: The scan/diff/plan/apply pipeline with
//!   partial-failure tolerance
//! - **Query Builders**: Parameterized totals and rows queries over
//!   metrics views
//!
//! The entry point is [`ReconcileService`]; everything else supports it or
//! the read path.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod artifacts;
pub mod graph;
pub mod materialize;
pub mod metrics;
pub mod reconcile;
pub mod sql_deps;

pub use graph::{DependencyGraph, TopoOutcome};
pub use metrics::{FilterCondition, MetricsFilter, RowsQuery, TimeRange, TotalsQuery};
pub use reconcile::{ReconcileError, ReconcileOptions, ReconcileResult, ReconcileService};
