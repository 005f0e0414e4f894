//! Bounded connection pool with blocking, time-limited acquisition.
//!
//! Connections are opened lazily on first demand and returned on drop of the
//! [`PooledConnection`] guard, so every successful `acquire` is released
//! exactly once, including on error paths. A connection marked broken is
//! discarded instead of returned and a replacement is opened on a later
//! `acquire`.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::manager::ConnectionManager;
use super::DbError;

struct PoolState<C> {
    idle: Vec<C>,
    /// Open connections, idle or checked out.
    live: usize,
    checked_out: usize,
    draining: bool,
}

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub live: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub draining: bool,
}

/// A bounded pool of connections produced by a [`ConnectionManager`].
pub struct Pool<C> {
    max_size: usize,
    acquire_timeout: Duration,
    manager: Box<dyn ConnectionManager<Connection = C>>,
    state: Mutex<PoolState<C>>,
    available: Condvar,
}

impl<C: Send> Pool<C> {
    /// Creates a pool. No connection is opened until the first `acquire`.
    pub fn new<M>(manager: M, max_size: usize, acquire_timeout: Duration) -> Self
    where
        M: ConnectionManager<Connection = C> + 'static,
    {
        let max_size = max_size.max(1);
        log::info!(
            "Connection pool created (max_size={}, acquire_timeout={:?})",
            max_size,
            acquire_timeout
        );
        Self {
            max_size,
            acquire_timeout,
            manager: Box::new(manager),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
                checked_out: 0,
                draining: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Acquires a connection, waiting up to the pool's configured timeout.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>, DbError> {
        self.acquire_timeout(self.acquire_timeout)
    }

    /// Acquires a connection, waiting up to `timeout` for one to free up.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<'_, C>, DbError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut state = self.lock()?;

        loop {
            if state.draining {
                return Err(DbError::Draining);
            }

            if let Some(mut conn) = state.idle.pop() {
                state.checked_out += 1;
                drop(state);
                match self.manager.is_valid(&mut conn) {
                    Ok(()) => return Ok(self.guard(conn)),
                    Err(e) => {
                        log::warn!("Discarding idle connection that failed validation: {}", e);
                        drop(conn);
                        state = self.lock()?;
                        state.live -= 1;
                        state.checked_out -= 1;
                        continue;
                    }
                }
            }

            if state.live < self.max_size {
                state.live += 1;
                state.checked_out += 1;
                drop(state);
                return match self.manager.connect() {
                    Ok(conn) => Ok(self.guard(conn)),
                    Err(e) => {
                        let mut state = self.lock()?;
                        state.live -= 1;
                        state.checked_out -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::PoolExhausted {
                    waited: now - started,
                });
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|_| DbError::LockPoisoned)?;
            state = guard;
        }
    }

    /// Returns a connection to the pool. Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection<'_, C>) {
        drop(conn);
    }

    /// Rejects new acquisitions and waits until every checked-out connection
    /// has been released, or `timeout` elapses.
    pub fn drain(&self, timeout: Duration) -> Result<(), DbError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        state.draining = true;
        self.available.notify_all();
        log::info!(
            "Draining connection pool ({} connection(s) checked out)",
            state.checked_out
        );

        while state.checked_out > 0 {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Pool drain timed out with {} connection(s) still checked out",
                    state.checked_out
                );
                return Err(DbError::PoolExhausted { waited: timeout });
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|_| DbError::LockPoisoned)?;
            state = guard;
        }

        log::info!("Connection pool drained");
        Ok(())
    }

    /// Closes every idle connection. Checked-out connections are closed as
    /// they are released if the pool is draining.
    pub fn close(&self) -> Result<(), DbError> {
        let mut state = self.lock()?;
        let closed = state.idle.len();
        state.live -= closed;
        state.idle.clear();
        log::info!("Connection pool closed ({} idle connection(s))", closed);
        Ok(())
    }

    pub fn status(&self) -> Result<PoolStatus, DbError> {
        let state = self.lock()?;
        Ok(PoolStatus {
            max_size: self.max_size,
            live: state.live,
            idle: state.idle.len(),
            checked_out: state.checked_out,
            draining: state.draining,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState<C>>, DbError> {
        self.state.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn guard(&self, conn: C) -> PooledConnection<'_, C> {
        PooledConnection {
            pool: self,
            conn: Some(conn),
            broken: false,
        }
    }

    fn put_back(&self, conn: C, broken: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.checked_out -= 1;
        if broken || state.draining {
            state.live -= 1;
            drop(conn);
        } else {
            state.idle.push(conn);
        }
        self.available.notify_all();
    }
}

/// A checked-out connection. Returned to the pool when dropped.
pub struct PooledConnection<'a, C: Send> {
    pool: &'a Pool<C>,
    conn: Option<C>,
    broken: bool,
}

impl<C: Send> PooledConnection<'_, C> {
    /// Marks the connection as unusable; it is discarded instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C: Send> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Send> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Send> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn, self.broken);
        }
    }
}
