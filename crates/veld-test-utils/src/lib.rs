//! # veld-test-utils
//!
//! Shared test doubles and fixtures for the Veld crates: an in-memory mock
//! OLAP engine that records every statement, plus helpers that write
//! convention-path artifacts into a repository.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod fixtures;
pub mod mock_olap;

pub use mock_olap::MockOlap;
