//! Priority-aware connection pool.
//!
//! Engines pre-warm each session (extensions, settings) before use, so the
//! pool owns a fixed set of initialized sessions rather than opening them on
//! demand. Reconciliation work (low priority, bulk DDL) and interactive
//! queries (high priority, latency-sensitive) compete for the same slots;
//! the pool arbitrates contention by priority without ever exceeding the
//! configured size and without reordering equal-priority waiters.
//!
//! Internals: a single mutex guards the free list and a priority-ordered
//! wait queue (`BinaryHeap` keyed by priority, FIFO within a priority via a
//! monotonic sequence number). A freed slot is handed to the highest-ranked
//! live waiter over a `oneshot` channel. Waiters that time out are removed
//! lazily: their dead receiver is skipped at grant time, so cancellation
//! never consumes a slot.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use veld_core::{Error, Result};

struct Waiter<C> {
    priority: i32,
    seq: u64,
    tx: oneshot::Sender<C>,
}

impl<C> PartialEq for Waiter<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<C> Eq for Waiter<C> {}

impl<C> PartialOrd for Waiter<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Waiter<C> {
    // Max-heap: highest priority first, then lowest sequence (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct PoolState<C> {
    available: VecDeque<C>,
    waiters: BinaryHeap<Waiter<C>>,
    next_seq: u64,
    closed: bool,
}

/// Bounded pool of pre-warmed engine sessions with priority-ordered
/// acquisition.
pub struct PriorityPool<C: Send + 'static> {
    shared: Arc<Mutex<PoolState<C>>>,
}

impl<C: Send + 'static> PriorityPool<C> {
    /// Creates a pool owning the given pre-initialized connections.
    ///
    /// The pool size is fixed at `connections.len()` for its lifetime.
    #[must_use]
    pub fn new(connections: Vec<C>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(PoolState {
                available: connections.into(),
                waiters: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            })),
        }
    }

    /// Acquires an exclusive connection.
    ///
    /// Returns immediately if a slot is free; otherwise blocks until one
    /// frees, the deadline elapses, or the pool closes. When a slot frees it
    /// goes to the highest-priority waiter; ties are broken by arrival
    /// order. Acquisition never partially succeeds: either a guard is
    /// returned or an error is, never both.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] if the pool is (or becomes) closed
    /// - [`Error::ResourceExhausted`] if `deadline` elapses while queued;
    ///   the waiter is removed without consuming a slot
    pub async fn acquire(
        &self,
        priority: i32,
        deadline: Option<Duration>,
    ) -> Result<PoolGuard<C>> {
        let mut rx = {
            let mut state = self.lock()?;
            if state.closed {
                return Err(Error::closed("connection pool is closed"));
            }
            if let Some(conn) = state.available.pop_front() {
                return Ok(PoolGuard {
                    shared: Arc::clone(&self.shared),
                    conn: Some(conn),
                });
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiters.push(Waiter { priority, seq, tx });
            debug!(priority, seq, "queued for pool slot");
            rx
        };

        let conn = match deadline {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Err(_) => {
                    // Closing the channel cancels the waiter; its dead
                    // sender is skipped when a slot next frees. A grant
                    // that raced the deadline is already buffered in the
                    // channel, so it must be handed back or the pool would
                    // shrink by one.
                    rx.close();
                    if let Ok(conn) = rx.try_recv() {
                        return_slot(&self.shared, conn);
                    }
                    return Err(Error::resource_exhausted(format!(
                        "connection acquisition timed out after {limit:?}"
                    )));
                }
                Ok(Ok(conn)) => conn,
                Ok(Err(_)) => return Err(Error::closed("connection pool is closed")),
            },
            None => rx
                .await
                .map_err(|_| Error::closed("connection pool is closed"))?,
        };

        Ok(PoolGuard {
            shared: Arc::clone(&self.shared),
            conn: Some(conn),
        })
    }

    /// Closes the pool.
    ///
    /// Queued and subsequent `acquire` calls fail with [`Error::Closed`].
    /// Idle connections are dropped now; checked-out connections are dropped
    /// when their guards release them.
    pub fn close(&self) {
        let (waiters, idle) = {
            let Ok(mut state) = self.shared.lock() else {
                return;
            };
            state.closed = true;
            let waiters = std::mem::take(&mut state.waiters);
            let idle = std::mem::take(&mut state.available);
            (waiters, idle)
        };
        // Dropping the senders wakes every queued waiter with Closed.
        drop(waiters);
        drop(idle);
        debug!("connection pool closed");
    }

    /// Returns true once the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|s| s.closed).unwrap_or(true)
    }

    /// Number of idle connections currently in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.shared.lock().map(|s| s.available.len()).unwrap_or(0)
    }

    /// Number of callers currently queued.
    ///
    /// Includes timed-out waiters that have not yet been swept; intended for
    /// diagnostics only.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.shared.lock().map(|s| s.waiters.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PoolState<C>>> {
        self.shared
            .lock()
            .map_err(|_| Error::fatal("connection pool lock poisoned"))
    }
}

/// Returns a connection to the pool, granting it to the best live waiter if
/// any, or parking it in the free list.
fn return_slot<C: Send + 'static>(shared: &Mutex<PoolState<C>>, mut conn: C) {
    let Ok(mut state) = shared.lock() else {
        return;
    };
    if state.closed {
        return;
    }
    while let Some(waiter) = state.waiters.pop() {
        match waiter.tx.send(conn) {
            Ok(()) => return,
            // Receiver gone: the waiter timed out or was cancelled.
            Err(returned) => conn = returned,
        }
    }
    state.available.push_back(conn);
}

/// Exclusive checkout of a pooled connection.
///
/// The slot is returned exactly once: either by [`PoolGuard::release`] or on
/// drop, whichever happens first.
pub struct PoolGuard<C: Send + 'static> {
    shared: Arc<Mutex<PoolState<C>>>,
    conn: Option<C>,
}

impl<C: Send + 'static> PoolGuard<C> {
    /// Returns the connection to the pool.
    ///
    /// Consuming `self` makes a double release unrepresentable; the
    /// subsequent drop is a no-op.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            return_slot(&self.shared, conn);
        }
    }
}

impl<C: Send + 'static> Deref for PoolGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Invariant: Some until release() or drop, and release() consumes self.
        self.conn.as_ref().expect("pool guard already released")
    }
}

impl<C: Send + 'static> DerefMut for PoolGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("pool guard already released")
    }
}

impl<C: Send + 'static> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            return_slot(&self.shared, conn);
        }
    }
}
