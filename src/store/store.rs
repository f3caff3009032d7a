//! Entry Store Module
//!
//! The per-cache engine combining bounded HashMap storage with
//! least-recently-accessed eviction, idle-TTL expiry, and a single-flight
//! loader so concurrent misses for one key issue exactly one query.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{CacheError, Result};
use crate::store::entry::StoredEntry;
use crate::store::snapshot::CacheEntry;
use crate::store::stats::StoreStats;

// == Value Loader ==
/// The read-through seam: invoked on a miss to fetch the value for one key.
///
/// `Ok(Some(v))` commits `v` to the store. `Ok(None)` means the external
/// source has no mapping for the key; nothing is memoized and the next
/// lookup consults the loader again. Errors propagate to every caller
/// waiting on the load and are never memoized either.
#[async_trait]
pub trait ValueLoader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
}

/// Outcome shared with every caller coalesced onto one load.
type FlightResult = Result<Option<String>>;

/// An entry's slot in the access order: last-access instant plus the tie
/// breaking sequence assigned at that access.
type AccessStamp = (Instant, u64);

// == Store State ==
/// Everything behind the store's one mutex.
///
/// The lock is never held across an await; loads run in a detached task and
/// re-acquire it only to commit.
///
/// Access order is the `order` index, sorted by staleness. Its first entry
/// is always the least recently accessed key, so the size-bound eviction
/// and the idle-TTL sweep both pop from the front; the sequence half of the
/// stamp keeps entries loaded at the same instant in insertion order, so
/// the older of two untouched entries loses the eviction.
#[derive(Debug, Default)]
struct StoreState {
    /// Key-value storage
    entries: HashMap<String, StoredEntry>,
    /// (last_access, access_seq) -> key, most stale first
    order: BTreeMap<AccessStamp, String>,
    /// Source of access sequence numbers, strictly increasing
    next_seq: u64,
    /// In-flight loads, at most one per key
    flights: HashMap<String, watch::Receiver<Option<FlightResult>>>,
    /// Last successful load per key (Unix millis); survives eviction
    loaded_at: HashMap<String, u64>,
    /// Successful lookups per key; monotonic for the life of the store
    accesses: HashMap<String, u64>,
    /// Performance counters
    stats: StoreStats,
}

impl StoreState {
    /// Marks `key` as just accessed and returns its value, if present.
    /// Moves the entry to the freshest end of the access order.
    fn touch_value(&mut self, key: &str, now: Instant) -> Option<String> {
        let entry = self.entries.get_mut(key)?;
        let previous = entry.access_stamp();
        self.next_seq += 1;
        entry.touch(now, self.next_seq);
        let value = entry.value.clone();
        self.order.remove(&previous);
        self.order.insert((now, self.next_seq), key.to_string());
        Some(value)
    }

    /// Inserts a freshly loaded entry, releasing any order slot a previous
    /// value for the key was holding.
    fn insert_entry(&mut self, key: &str, value: String, now: Instant) {
        if let Some(previous) = self.entries.get(key) {
            self.order.remove(&previous.access_stamp());
        }
        self.next_seq += 1;
        let entry = StoredEntry::new(value, now, self.next_seq);
        self.loaded_at.insert(key.to_string(), entry.loaded_at_millis);
        self.order.insert((now, self.next_seq), key.to_string());
        self.entries.insert(key.to_string(), entry);
    }

    /// Removes `key` and its order slot. Not counted as an eviction.
    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.access_stamp());
        }
    }

    /// Drops every entry and order slot, leaving counters and the per-key
    /// side maps untouched.
    fn clear_entries(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Evicts the least recently accessed entry. Returns false when the
    /// store is empty.
    fn evict_oldest(&mut self) -> bool {
        let Some((&stamp, key)) = self.order.first_key_value() else {
            return false;
        };
        let key = key.clone();
        self.order.remove(&stamp);
        if self.entries.remove(&key).is_some() {
            self.stats.record_eviction();
            true
        } else {
            false
        }
    }

    /// Evicts every entry idle longer than `ttl`. Only the front of the
    /// order index is examined: the first live entry ends the sweep.
    fn sweep_expired(&mut self, ttl: Option<Duration>, now: Instant) -> u64 {
        let Some(ttl) = ttl else {
            return 0;
        };
        let mut evicted = 0;
        while let Some((&(last_access, _), _)) = self.order.first_key_value() {
            if now.duration_since(last_access) <= ttl {
                break;
            }
            if self.evict_oldest() {
                evicted += 1;
            }
        }
        evicted
    }
}

struct StoreShared {
    /// Maximum number of entries, 0 = unbounded
    max_size: u64,
    /// Idle TTL from last access, None = no time eviction
    idle_ttl: Option<Duration>,
    state: Mutex<StoreState>,
}

/// What a lookup found once the lock was released.
enum Claim {
    /// Live entry, value already copied out
    Value(String),
    /// Another caller owns the load; wait on its result
    Join(watch::Receiver<Option<FlightResult>>),
    /// This caller initiated the load
    Lead(watch::Receiver<Option<FlightResult>>),
}

// == Entry Store ==
/// Bounded, TTL-on-access key/value store with single-flight loading.
///
/// Cloning is cheap and shares the same underlying store.
#[derive(Clone)]
pub struct EntryStore {
    shared: Arc<StoreShared>,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a store.
    ///
    /// # Arguments
    /// * `max_size` - Maximum number of entries; 0 disables the bound
    /// * `idle_ttl` - Expiry measured from last access; None disables it
    pub fn new(max_size: u64, idle_ttl: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                max_size,
                idle_ttl,
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    // == Get ==
    /// Returns the cached value for `key`, loading it on a miss.
    ///
    /// Exactly one load runs per key at a time: the first caller to miss
    /// initiates it and every concurrent caller for the same key receives
    /// the same outcome. The load runs detached from any single caller, so
    /// a canceled caller never tears down a result other callers depend on.
    pub async fn get(&self, key: &str, loader: &Arc<dyn ValueLoader>) -> Result<Option<String>> {
        let claim = {
            let mut state = self.shared.lock_state();
            let now = Instant::now();
            state.sweep_expired(self.shared.idle_ttl, now);

            if let Some(value) = state.touch_value(key, now) {
                state.stats.record_hit();
                record_access(&mut state, key);
                Claim::Value(value)
            } else if let Some(rx) = state.flights.get(key) {
                Claim::Join(rx.clone())
            } else {
                // First caller to miss becomes the loader
                state.stats.record_miss();
                let rx = self.spawn_load(&mut state, key, loader);
                Claim::Lead(rx)
            }
        };

        match claim {
            Claim::Value(value) => Ok(Some(value)),
            Claim::Lead(rx) => {
                let outcome = await_flight(rx, key).await;
                if outcome.is_ok() {
                    let mut state = self.shared.lock_state();
                    record_access(&mut state, key);
                }
                outcome
            }
            Claim::Join(rx) => {
                let outcome = await_flight(rx, key).await;
                match &outcome {
                    Ok(Some(_)) => {
                        let mut state = self.shared.lock_state();
                        let _ = state.touch_value(key, Instant::now());
                        state.stats.record_hit();
                        record_access(&mut state, key);
                    }
                    Ok(None) => {
                        let mut state = self.shared.lock_state();
                        state.stats.record_miss();
                        record_access(&mut state, key);
                    }
                    Err(_) => {}
                }
                outcome
            }
        }
    }

    /// Registers the in-flight load for `key` and spawns the task driving
    /// it. Called with the state lock held so the flight is visible before
    /// any other caller can observe the miss.
    fn spawn_load(
        &self,
        state: &mut StoreState,
        key: &str,
        loader: &Arc<dyn ValueLoader>,
    ) -> watch::Receiver<Option<FlightResult>> {
        let (tx, rx) = watch::channel(None);
        state.flights.insert(key.to_string(), rx.clone());

        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(loader);
        let key = key.to_string();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = loader.load(&key).await;
            let elapsed_nanos = started.elapsed().as_nanos() as u64;

            let outcome: FlightResult = {
                let mut state = shared.lock_state();
                state.flights.remove(&key);
                match result {
                    Ok(Some(value)) => {
                        state.stats.record_load_success(elapsed_nanos);
                        shared.commit_locked(&mut state, &key, value.clone());
                        Ok(Some(value))
                    }
                    // A missing row is not memoized and counts as neither a
                    // load success nor a load exception
                    Ok(None) => Ok(None),
                    Err(err) => {
                        state.stats.record_load_exception();
                        Err(err)
                    }
                }
            };
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    // == Keys ==
    /// Snapshot of the current key set; may be stale by the time it is read.
    pub fn keys(&self) -> Vec<String> {
        self.shared.lock_state().entries.keys().cloned().collect()
    }

    // == Entries ==
    /// Defensive copy of the current key/value pairs.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.shared
            .lock_state()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    // == Snapshot Entries ==
    /// Current entries with their load time and access count, for the
    /// snapshot service.
    pub fn snapshot_entries(&self) -> Vec<CacheEntry> {
        let state = self.shared.lock_state();
        state
            .entries
            .iter()
            .map(|(key, entry)| CacheEntry {
                key: key.clone(),
                value: entry.value.clone(),
                loaded_at_millis: entry.loaded_at_millis,
                access_count: state.accesses.get(key).copied().unwrap_or(0),
            })
            .collect()
    }

    // == Invalidate ==
    /// Removes one key immediately. Not counted as an eviction.
    pub fn invalidate(&self, key: &str) {
        self.shared.lock_state().remove_entry(key);
    }

    // == Invalidate All ==
    /// Drops every entry but preserves all counters.
    pub fn invalidate_all(&self) {
        self.shared.lock_state().clear_entries();
    }

    // == Sweep Expired ==
    /// Evicts every entry idle longer than the TTL. Returns the number
    /// evicted. Also runs opportunistically inside get and commit.
    pub fn sweep_expired(&self) -> u64 {
        let mut state = self.shared.lock_state();
        state.sweep_expired(self.shared.idle_ttl, Instant::now())
    }

    // == Stats ==
    /// Returns a copy of the current counters.
    pub fn stats(&self) -> StoreStats {
        self.shared.lock_state().stats.clone()
    }

    // == Size ==
    /// Returns the current number of entries.
    pub fn size(&self) -> u64 {
        self.shared.lock_state().entries.len() as u64
    }

    // == Contains ==
    /// Whether `key` currently has a live entry.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.lock_state().entries.contains_key(key)
    }

    // == Loaded At ==
    /// Unix millis of the last successful load for `key`, if any.
    pub fn loaded_at(&self, key: &str) -> Option<u64> {
        self.shared.lock_state().loaded_at.get(key).copied()
    }

    // == Memory Estimate ==
    /// Two bytes per key character plus two per value character, summed
    /// over live entries. A lower bound; no overhead accounting.
    pub fn estimated_memory_bytes(&self) -> u64 {
        let state = self.shared.lock_state();
        state
            .entries
            .iter()
            .map(|(k, e)| 2 * k.len() as u64 + 2 * e.value.len() as u64)
            .sum()
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("EntryStore")
            .field("size", &state.entries.len())
            .field("max_size", &self.shared.max_size)
            .field("idle_ttl", &self.shared.idle_ttl)
            .finish()
    }
}

impl StoreShared {
    /// Acquires the state lock, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a freshly loaded value, evicting the least recently accessed
    /// entry first when the store is full.
    fn commit_locked(&self, state: &mut StoreState, key: &str, value: String) {
        let now = Instant::now();
        state.sweep_expired(self.idle_ttl, now);

        let is_overwrite = state.entries.contains_key(key);
        if !is_overwrite && self.max_size > 0 && state.entries.len() as u64 >= self.max_size {
            state.evict_oldest();
        }

        state.insert_entry(key, value, now);
    }
}

/// One successful lookup for `key`, hit or confirmed-absent. Failed loads
/// never reach this.
fn record_access(state: &mut StoreState, key: &str) {
    *state.accesses.entry(key.to_string()).or_insert(0) += 1;
}

/// Waits for the shared load outcome.
async fn await_flight(
    mut rx: watch::Receiver<Option<FlightResult>>,
    key: &str,
) -> FlightResult {
    loop {
        {
            let value = rx.borrow_and_update();
            if let Some(outcome) = value.as_ref() {
                return outcome.clone();
            }
        }
        if rx.changed().await.is_err() {
            return Err(CacheError::Internal(format!(
                "load for key '{}' was abandoned",
                key
            )));
        }
    }
}
