//! Cache Statistics Module
//!
//! Raw counters recorded by the store, and the derived point-in-time
//! statistics record exposed to operators.

use serde::Serialize;

// == Store Stats ==
/// Raw counters maintained by an EntryStore.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Lookups answered from a live entry (or a joined load that committed)
    pub hits: u64,
    /// Lookups that had to consult the loader and did not commit a hit
    pub misses: u64,
    /// Loads that committed a value
    pub load_successes: u64,
    /// Loads that failed with an error
    pub load_exceptions: u64,
    /// Entries removed by size or idle-TTL eviction
    pub evictions: u64,
    /// Wall time spent inside successful loads
    pub total_load_time_nanos: u64,
}

impl StoreStats {
    /// Creates stats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Load Success ==
    pub fn record_load_success(&mut self, elapsed_nanos: u64) {
        self.load_successes += 1;
        self.total_load_time_nanos += elapsed_nanos;
    }

    // == Record Load Exception ==
    pub fn record_load_exception(&mut self) {
        self.load_exceptions += 1;
    }

    // == Request Count ==
    /// Total lookups, derived rather than stored.
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or NaN when no requests have been
    /// made. NaN serializes to JSON null, which consumers render as a dash.
    pub fn hit_rate(&self) -> f64 {
        let total = self.request_count();
        if total == 0 {
            f64::NAN
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Average Load Penalty ==
    /// Mean nanoseconds per successful load, or 0.0 before any load.
    pub fn average_load_penalty_nanos(&self) -> f64 {
        if self.load_successes == 0 {
            0.0
        } else {
            self.total_load_time_nanos as f64 / self.load_successes as f64
        }
    }
}

// == Cache Statistics ==
/// Point-in-time statistics for one registered cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub cache_definition_id: String,
    pub name: String,
    pub size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub load_success_count: u64,
    pub load_exception_count: u64,
    pub hit_rate: f64,
    pub eviction_count: u64,
    pub request_count: u64,
    pub total_load_time_nanos: u64,
    pub average_load_penalty_nanos: f64,
    /// Raw character cost of keys and values; a deliberate lower bound with
    /// no per-entry overhead accounting
    pub estimated_memory_bytes: u64,
}

impl CacheStatistics {
    /// Assembles the derived record from raw counters.
    pub fn from_counters(
        cache_definition_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        estimated_memory_bytes: u64,
        stats: &StoreStats,
    ) -> Self {
        Self {
            cache_definition_id: cache_definition_id.into(),
            name: name.into(),
            size,
            hit_count: stats.hits,
            miss_count: stats.misses,
            load_success_count: stats.load_successes,
            load_exception_count: stats.load_exceptions,
            hit_rate: stats.hit_rate(),
            eviction_count: stats.evictions,
            request_count: stats.request_count(),
            total_load_time_nanos: stats.total_load_time_nanos,
            average_load_penalty_nanos: stats.average_load_penalty_nanos(),
            estimated_memory_bytes,
        }
    }
}
