//! Connection pool for the embedded store
//!
//! Hands out exclusive, reusable SQLite handles and reclaims them
//! automatically. The pool bounds the number of concurrently open handles;
//! SQLite's own locking governs write/write contention beneath it.
//!
//! A `PooledConnection` is a scoped resource: acquired explicitly, returned
//! on `Drop` on every exit path. `acquire()` blocks up to the configured
//! timeout and fails with `StoreError::PoolExhausted` once it elapses —
//! callers should treat that as retryable.

use crate::store::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Pool sizing and timeout configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of concurrently open handles
    pub max_connections: usize,
    /// Handles pre-warmed at startup to avoid cold-start latency
    pub min_idle: usize,
    /// Bounded wait in `acquire()` before reporting exhaustion
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_idle: 2,
            acquire_timeout: Duration::from_millis(5000),
        }
    }
}

/// Point-in-time pool counters for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles currently open (idle + checked out)
    pub open: usize,
    /// Handles sitting idle in the pool
    pub idle: usize,
    /// Handles currently checked out
    pub in_flight: usize,
    /// Configured maximum
    pub max_connections: usize,
}

struct PoolShared {
    state: Mutex<PoolState>,
    cvar: Condvar,
    max_connections: usize,
}

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Bounded pool of reusable handles to one store file
pub struct ConnectionPool {
    db_path: PathBuf,
    shared: Arc<PoolShared>,
    acquire_timeout: Duration,
}

/// Exclusive handle checked out from the pool
///
/// Derefs to `rusqlite::Connection`; returned to the pool automatically on
/// scope exit.
pub struct PooledConnection {
    conn: Option<Connection>,
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        match self.conn.take() {
            Some(conn) => state.idle.push(conn),
            // Handle was lost mid-operation; shrink the open count so a
            // replacement can be created.
            None => state.open = state.open.saturating_sub(1),
        }
        drop(state);
        self.shared.cvar.notify_one();
    }
}

impl ConnectionPool {
    /// Open a pool against a store file, pre-warming `min_idle` handles
    pub fn open(db_path: impl Into<PathBuf>, config: PoolConfig) -> StoreResult<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let min_idle = config.min_idle.min(config.max_connections);
        let mut idle = Vec::with_capacity(min_idle);
        for _ in 0..min_idle {
            idle.push(Self::open_connection(&db_path)?);
        }

        tracing::debug!(
            path = %db_path.display(),
            prewarmed = idle.len(),
            max = config.max_connections,
            "connection pool opened"
        );

        Ok(Self {
            db_path,
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    open: idle.len(),
                    idle,
                }),
                cvar: Condvar::new(),
                max_connections: config.max_connections,
            }),
            acquire_timeout: config.acquire_timeout,
        })
    }

    fn open_connection(db_path: &Path) -> StoreResult<Connection> {
        let conn = Connection::open(db_path)?;

        // Configure for concurrent readers and bounded writer waits
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        Ok(conn)
    }

    /// Check out an exclusive handle, waiting up to the configured timeout
    pub fn acquire(&self) -> StoreResult<PooledConnection> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    shared: self.shared.clone(),
                });
            }

            if state.open < self.shared.max_connections {
                state.open += 1;
                drop(state);

                match Self::open_connection(&self.db_path) {
                    Ok(conn) => {
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            shared: self.shared.clone(),
                        });
                    }
                    Err(e) => {
                        let mut state =
                            self.shared.state.lock().expect("pool mutex poisoned");
                        state.open = state.open.saturating_sub(1);
                        drop(state);
                        self.shared.cvar.notify_one();
                        return Err(e);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StoreError::PoolExhausted {
                    waited_ms: self.acquire_timeout.as_millis() as u64,
                });
            }

            let (guard, timeout) = self
                .shared
                .cvar
                .wait_timeout(state, remaining)
                .expect("pool condvar poisoned");
            state = guard;

            if timeout.timed_out() && state.idle.is_empty() {
                return Err(StoreError::PoolExhausted {
                    waited_ms: self.acquire_timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Current pool counters
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().expect("pool mutex poisoned");
        PoolStats {
            open: state.open,
            idle: state.idle.len(),
            in_flight: state.open - state.idle.len(),
            max_connections: self.shared.max_connections,
        }
    }

    /// Path of the underlying store file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
