//! Pluggable engine driver registry.
//!
//! Backends register a named [`Driver`] in an explicit registry object
//! created at startup and passed to whatever needs to open engines. There is
//! deliberately no global mutable registry: each backend module contributes
//! its driver during initialization, and lookups go through the instance.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use veld_core::{Error, Result};

use crate::connection::OlapHandle;

/// Constructor for one engine backend.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Opens an engine described by `dsn`, pre-warming the session pool and
    /// the out-of-band metadata session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine cannot be opened.
    async fn open(&self, dsn: &str, pool_size: usize) -> Result<OlapHandle>;
}

/// Registry of engine drivers, keyed by name.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if a driver with the same name is already
    /// registered.
    pub fn register(&self, name: impl Into<String>, driver: Arc<dyn Driver>) -> Result<()> {
        let name = name.into();
        let mut drivers = self
            .drivers
            .write()
            .map_err(|_| Error::storage("driver registry lock poisoned"))?;
        if drivers.contains_key(&name) {
            return Err(Error::conflict(format!(
                "driver '{name}' is already registered"
            )));
        }
        drivers.insert(name, driver);
        Ok(())
    }

    /// Opens an engine through the named driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no driver is registered under `name`,
    /// or the driver's own error if opening fails.
    pub async fn open(&self, name: &str, dsn: &str, pool_size: usize) -> Result<OlapHandle> {
        let driver = {
            let drivers = self
                .drivers
                .read()
                .map_err(|_| Error::storage("driver registry lock poisoned"))?;
            drivers
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found("driver", name))?
        };
        driver.open(dsn, pool_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OlapSession;
    use crate::types::{QueryResult, Statement, Table};

    struct NullSession;

    #[async_trait]
    impl OlapSession for NullSession {
        async fn execute(&self, _stmt: &Statement) -> Result<QueryResult> {
            Ok(QueryResult::empty())
        }

        async fn lookup_table(&self, name: &str) -> Result<Table> {
            Err(Error::not_found("table", name))
        }

        async fn all_tables(&self) -> Result<Vec<Table>> {
            Ok(Vec::new())
        }
    }

    struct NullDriver;

    #[async_trait]
    impl Driver for NullDriver {
        async fn open(&self, _dsn: &str, pool_size: usize) -> Result<OlapHandle> {
            let sessions: Vec<Arc<dyn OlapSession>> = (0..pool_size)
                .map(|_| Arc::new(NullSession) as Arc<dyn OlapSession>)
                .collect();
            Ok(OlapHandle::new(sessions, Arc::new(NullSession)))
        }
    }

    #[tokio::test]
    async fn register_and_open() {
        let registry = DriverRegistry::new();
        registry.register("null", Arc::new(NullDriver)).unwrap();

        let handle = registry.open("null", "", 2).await.unwrap();
        let guard = handle.acquire(0, None).await.unwrap();
        guard.release();
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let registry = DriverRegistry::new();
        registry.register("null", Arc::new(NullDriver)).unwrap();
        let err = registry.register("null", Arc::new(NullDriver)).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn unknown_driver_is_not_found() {
        let registry = DriverRegistry::new();
        let err = registry.open("duckdb", "", 1).await.map(|_| ()).unwrap_err();
        assert!(err.is_not_found());
    }
}
