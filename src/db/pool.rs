//! Connection Pool Module
//!
//! A bounded pool of database connections scoped to one registered cache.
//! Connections are opened lazily on first borrow, reused while healthy, and
//! dropped when marked broken or when the pool closes.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::db::driver::{ConnectOptions, DbConnection, DriverRegistry};
use crate::error::{CacheError, Result};

// == Connection Pool ==
/// Per-cache bounded connection pool.
///
/// A pool is bound to exactly one registration; replacing a registration
/// builds a fresh pool and retires the old one. Pools are never shared
/// between caches, even when two caches point at the same url, so pool
/// sizing stays predictable per cache.
pub struct ConnectionPool {
    /// `cache-<name>`, used in logs and error messages
    name: String,
    driver_name: String,
    registry: Arc<DriverRegistry>,
    options: ConnectOptions,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn DbConnection>>>,
    closed: AtomicBool,
    borrow_timeout: Duration,
}

impl ConnectionPool {
    // == Constructor ==
    /// Creates a pool with `max_connections` slots. No connection is opened
    /// until the first borrow.
    pub fn new(
        cache_name: &str,
        registry: Arc<DriverRegistry>,
        driver_name: String,
        options: ConnectOptions,
        max_connections: u32,
        borrow_timeout: Duration,
    ) -> Self {
        Self {
            name: format!("cache-{}", cache_name),
            driver_name,
            registry,
            options,
            semaphore: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            borrow_timeout,
        }
    }

    /// The pool's observability name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // == Borrow ==
    /// Takes a connection, opening one if no idle connection is available.
    ///
    /// Blocks up to the borrow timeout for a free slot. Canceling the
    /// returned future while waiting releases the slot. Dropping the guard
    /// returns the connection to the pool unless it was marked broken.
    pub async fn borrow(&self) -> Result<PooledConnection<'_>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match tokio::time::timeout(self.borrow_timeout, acquire).await {
            Err(_) => {
                return Err(CacheError::PoolExhausted(format!(
                    "pool '{}' has no free connection after {:?}",
                    self.name, self.borrow_timeout
                )))
            }
            Ok(Err(_)) => return Err(self.closed_error()),
            Ok(Ok(permit)) => permit,
        };

        let reused = self.lock_idle().pop();
        let connection = match reused {
            Some(connection) => connection,
            None => {
                let driver = self.registry.get(&self.driver_name).ok_or_else(|| {
                    CacheError::Connection(format!("Driver not found: {}", self.driver_name))
                })?;
                debug!(pool = %self.name, "opening new connection");
                driver.connect(&self.options).await?
            }
        };

        Ok(PooledConnection {
            pool: self,
            connection: Some(connection),
            _permit: permit,
            broken: false,
        })
    }

    // == Close ==
    /// Drains idle connections and signals waiting borrowers to abandon.
    ///
    /// Connections already borrowed finish their work; their guards drop
    /// them instead of returning them. Safe to call from the registration
    /// swap path.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();
        self.lock_idle().clear();
        debug!(pool = %self.name, "connection pool closed");
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> CacheError {
        CacheError::Connection(format!("pool '{}' is closed", self.name))
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Box<dyn DbConnection>>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("driver", &self.driver_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// == Pooled Connection ==
/// Guard over a borrowed connection. Dropping it returns the connection to
/// the pool, or discards it when broken or when the pool has closed.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Box<dyn DbConnection>>,
    _permit: OwnedSemaphorePermit,
    broken: bool,
}

impl PooledConnection<'_> {
    /// Marks the connection as broken so it is dropped instead of reused.
    pub fn invalidate(&mut self) {
        self.broken = true;
    }
}

impl std::fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish()
    }
}

impl Deref for PooledConnection<'_> {
    type Target = dyn DbConnection;

    fn deref(&self) -> &Self::Target {
        // The connection is only taken in drop
        self.connection.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_deref_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if !self.broken && !self.pool.is_closed() {
                self.pool.lock_idle().push(connection);
            }
        }
    }
}
