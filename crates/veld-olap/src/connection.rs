//! OLAP engine connection traits.
//!
//! An [`OlapSession`] is one engine session capable of executing DDL, DML,
//! and SELECT statements. An [`OlapHandle`] bundles the bounded pool of
//! pre-warmed sessions with one out-of-band metadata session used for
//! catalog and information-schema lookups, so metadata reads never compete
//! with the main workload for a pool slot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use veld_core::Result;

use crate::pool::{PoolGuard, PriorityPool};
use crate::types::{QueryResult, Statement, Table};

/// A single engine session.
///
/// Sessions are never shared between two concurrent logical callers; the
/// pool hands out exclusive ownership for the duration of a checkout.
#[async_trait]
pub trait OlapSession: Send + Sync + 'static {
    /// Executes a statement.
    ///
    /// Dry runs must validate the statement without materializing results.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::Engine`] if the engine rejects the
    /// statement.
    async fn execute(&self, stmt: &Statement) -> Result<QueryResult>;

    /// Looks up a table in the engine's information schema.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::NotFound`] if no such table exists.
    async fn lookup_table(&self, name: &str) -> Result<Table>;

    /// Lists all tables known to the engine's information schema.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::Engine`] if the listing fails.
    async fn all_tables(&self) -> Result<Vec<Table>>;
}

/// A pooled OLAP engine: N pre-warmed sessions behind the priority
/// scheduler, plus one metadata session outside the pool.
pub struct OlapHandle {
    pool: PriorityPool<Arc<dyn OlapSession>>,
    meta: Arc<dyn OlapSession>,
}

impl OlapHandle {
    /// Creates a handle from pooled sessions and a dedicated metadata
    /// session.
    #[must_use]
    pub fn new(sessions: Vec<Arc<dyn OlapSession>>, meta: Arc<dyn OlapSession>) -> Self {
        Self {
            pool: PriorityPool::new(sessions),
            meta,
        }
    }

    /// Acquires an exclusive session from the pool.
    ///
    /// Blocks until a session frees, the deadline elapses, or the pool is
    /// closed. Higher priorities are granted first; equal priorities are
    /// FIFO.
    ///
    /// # Errors
    ///
    /// Returns [`veld_core::Error::ResourceExhausted`] on deadline, or
    /// [`veld_core::Error::Closed`] after shutdown.
    pub async fn acquire(
        &self,
        priority: i32,
        deadline: Option<Duration>,
    ) -> Result<PoolGuard<Arc<dyn OlapSession>>> {
        self.pool.acquire(priority, deadline).await
    }

    /// Returns the out-of-band metadata session.
    ///
    /// Used for information-schema lookups and dry-run validations; never
    /// subject to the pool's wait queue.
    #[must_use]
    pub fn meta(&self) -> &Arc<dyn OlapSession> {
        &self.meta
    }

    /// Closes the pool. See [`PriorityPool::close`].
    pub fn close(&self) {
        self.pool.close();
    }
}
