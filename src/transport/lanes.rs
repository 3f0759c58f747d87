//! Bounded set of reusable connections ("lanes").
//!
//! A semaphore caps how many lanes are in use at once. Idle lanes are kept for
//! the next checkout, and a lane that has carried `max_messages` messages is
//! dropped on checkin so the next checkout builds a fresh one. A lease that is
//! dropped without being checked in discards its lane.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::DispatchError;

type Builder<C> = Box<dyn Fn() -> Result<C, DispatchError> + Send + Sync>;

pub(crate) struct LanePool<C> {
    build: Builder<C>,
    max_messages: usize,
    idle: Mutex<Vec<(C, usize)>>,
    permits: Semaphore,
    built: AtomicUsize,
}

/// A lane checked out of the pool. Holds one permit until dropped.
pub(crate) struct Lease<'a, C> {
    pub(crate) conn: C,
    sent: usize,
    _permit: SemaphorePermit<'a>,
}

impl<C> Lease<'_, C> {
    /// Count one message carried by this lane.
    pub(crate) fn record_sent(&mut self) {
        self.sent += 1;
    }
}

impl<C> LanePool<C> {
    /// Create a pool and build its first lane, so a failing builder fails here.
    pub(crate) fn new<F>(
        connections: usize,
        max_messages: usize,
        build: F,
    ) -> Result<Self, DispatchError>
    where
        F: Fn() -> Result<C, DispatchError> + Send + Sync + 'static,
    {
        let pool = Self {
            build: Box::new(build),
            max_messages: max_messages.max(1),
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(connections.max(1)),
            built: AtomicUsize::new(0),
        };
        let first = pool.open_lane()?;
        pool.idle.lock().push((first, 0));
        Ok(pool)
    }

    fn open_lane(&self) -> Result<C, DispatchError> {
        let conn = (self.build)()?;
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }

    /// Wait for a permit, then reuse an idle lane or build a new one.
    ///
    /// Fails with `Closed` once [`close`](Self::close) has been called.
    pub(crate) async fn checkout(&self) -> Result<Lease<'_, C>, DispatchError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;

        let idle = self.idle.lock().pop();
        let (conn, sent) = match idle {
            Some(lane) => lane,
            None => {
                tracing::debug!("Opening connection");
                (self.open_lane()?, 0)
            }
        };

        Ok(Lease {
            conn,
            sent,
            _permit: permit,
        })
    }

    /// Return a lane to the idle set. Returns false if it was dropped instead.
    pub(crate) fn checkin(&self, lease: Lease<'_, C>) -> bool {
        if lease.sent >= self.max_messages {
            tracing::debug!(sent = lease.sent, "Recycling connection");
            return false;
        }
        if self.permits.is_closed() {
            return false;
        }
        self.idle.lock().push((lease.conn, lease.sent));
        true
    }

    /// Refuse further checkouts and drop every idle lane. Returns how many
    /// lanes were dropped.
    pub(crate) fn close(&self) -> usize {
        self.permits.close();
        let drained = std::mem::take(&mut *self.idle.lock());
        drained.len()
    }

    /// Lanes built over the pool's lifetime.
    pub(crate) fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Lanes currently idle.
    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
