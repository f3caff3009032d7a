//! Database Module
//!
//! The engine's view of external databases: the driver seam, the built-in
//! PostgreSQL driver, the per-cache connection pool, and the read-through
//! query loader.

mod driver;
mod loader;
mod pool;
mod postgres;

// Re-export public types
pub use driver::{ConnectOptions, DbConnection, Driver, DriverRegistry, RowSet};
pub use loader::QueryLoader;
pub use pool::{ConnectionPool, PooledConnection};
pub use postgres::PostgresDriver;
