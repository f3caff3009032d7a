//! Query Cache - a read-through SQL key/value cache engine
//!
//! Operators define named caches bound to a parameterized query against an
//! external database. Channel code looks values up by cache name; misses
//! run the query exactly once per key, even under concurrent demand, and
//! memoize the result under a size bound and an idle TTL.

pub mod api;
pub mod config;
pub mod db;
pub mod definition;
pub mod engine;
pub mod error;
pub mod models;
pub mod repo;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use definition::CacheDefinition;
pub use engine::{CacheEngine, CacheLookup, FacadeSink, GlobalVariableStore};
pub use error::CacheError;
pub use tasks::spawn_sweep_task;
