//! Database Driver Module
//!
//! The seam between the cache engine and external databases. A driver is
//! registered under a name; cache definitions reference it by that name,
//! the way the original deployments referenced a driver class.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// == Connect Options ==
/// Connection parameters carried by a cache definition.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub username: String,
    pub password: String,
}

// == Row Set ==
/// Result of one parameterized query: driver-reported column labels and the
/// returned rows. Cells are `None` where the database returned SQL NULL.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Resolves a configured column label against the driver-reported
    /// labels: exact match first, then case-insensitive.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == label)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(label))
            })
    }
}

// == Connection ==
/// A live connection to an external database.
#[async_trait]
pub trait DbConnection: Send {
    /// Executes the parameterized query with `param` bound to its single
    /// positional parameter. The query text is passed through verbatim.
    async fn query(&mut self, sql: &str, param: &str) -> Result<RowSet>;

    /// Whether the connection still answers within `timeout`.
    async fn is_valid(&mut self, timeout: Duration) -> bool;
}

// == Driver ==
/// Opens connections for one kind of external database.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DbConnection>>;
}

// == Driver Registry ==
/// Name-keyed set of available drivers. Built once at startup; definitions
/// referencing an unknown name fail with a "Driver not found" message at
/// connect time rather than at registration.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in drivers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let postgres: Arc<dyn Driver> = Arc::new(super::postgres::PostgresDriver);
        registry.register("postgres", Arc::clone(&postgres));
        registry.register("postgresql", postgres);
        registry
    }

    /// Registers a driver under `name`, replacing any previous binding.
    pub fn register(&mut self, name: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(name.to_string(), driver);
    }

    /// Looks up a driver by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(name).cloned()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.drivers.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry").field("drivers", &names).finish()
    }
}
