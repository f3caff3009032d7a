//! Store Module
//!
//! Per-cache storage: bounded entries with idle-TTL eviction, single-flight
//! read-through loading, statistics, and snapshot assembly.

mod entry;
mod snapshot;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, StoredEntry};
pub use snapshot::{
    apply as apply_snapshot_query, CacheEntry, CacheSnapshot, FilterScope, SnapshotQuery, SortDir,
    SortField,
};
pub use stats::{CacheStatistics, StoreStats};
pub use store::{EntryStore, ValueLoader};
