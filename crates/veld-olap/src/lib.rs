//! # veld-olap
//!
//! OLAP engine boundary for the Veld analytics runtime.
//!
//! This crate defines the contract between the reconciliation core and the
//! pluggable analytical query engines:
//!
//! - **Statement/Result Types**: What gets executed and what comes back
//! - **Session Traits**: Execution plus information-schema lookup
//! - **Priority Pool**: The bounded, priority-arbitrated set of pre-warmed
//!   engine sessions shared by reconciliation and interactive queries
//! - **Driver Registry**: Explicit name-to-backend constructor mapping
//!
//! Specific engine wire protocols live behind [`OlapSession`]; this crate
//! carries no protocol code of its own.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod connection;
pub mod pool;
pub mod registry;
pub mod types;

pub use connection::{OlapHandle, OlapSession};
pub use pool::{PoolGuard, PriorityPool};
pub use registry::{Driver, DriverRegistry};
pub use types::{QueryResult, Statement, Table};
