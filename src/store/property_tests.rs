//! Property-Based Tests for the Store Module
//!
//! Uses proptest to verify the store's counter identities, size bound, and
//! snapshot behavior over arbitrary operation sequences.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;

use crate::error::Result;
use crate::store::snapshot::{apply, FilterScope, SnapshotQuery, SortDir, SortField};
use crate::store::{CacheEntry, EntryStore, ValueLoader};

// == Test Configuration ==
const TEST_MAX_SIZE: u64 = 50;

// == Strategies ==
/// Generates keys drawn from a small universe so hits actually occur.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f][0-9]{1,2}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,32}".prop_map(|s| s)
}

/// A sequence of store operations for testing.
#[derive(Debug, Clone)]
enum StoreOp {
    Get { key: String },
    Invalidate { key: String },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => key_strategy().prop_map(|key| StoreOp::Get { key }),
        1 => key_strategy().prop_map(|key| StoreOp::Invalidate { key }),
    ]
}

/// Loader over a fixed table, counting invocations.
struct TableLoader {
    table: Mutex<HashMap<String, String>>,
    calls: AtomicU64,
}

impl TableLoader {
    fn new(pairs: Vec<(String, String)>) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(pairs.into_iter().collect()),
            calls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl ValueLoader for TableLoader {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.lock().unwrap().get(key).cloned())
    }
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("test runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any operation sequence, requestCount equals hits plus misses, and
    // the loader outcomes never exceed the misses that triggered them.
    #[test]
    fn prop_counter_identities(
        table in prop::collection::vec((key_strategy(), value_strategy()), 1..20),
        ops in prop::collection::vec(store_op_strategy(), 1..60)
    ) {
        let loader = TableLoader::new(table);
        let loader_dyn: Arc<dyn ValueLoader> = loader.clone();
        let store = EntryStore::new(0, None);
        let mut lookups: u64 = 0;

        run(async {
            for op in ops {
                match op {
                    StoreOp::Get { key } => {
                        lookups += 1;
                        let _ = store.get(&key, &loader_dyn).await;
                    }
                    StoreOp::Invalidate { key } => store.invalidate(&key),
                }
            }
        });

        let stats = store.stats();
        prop_assert_eq!(stats.request_count(), stats.hits + stats.misses);
        prop_assert_eq!(stats.request_count(), lookups, "every lookup is a hit or a miss");
        prop_assert!(stats.load_successes + stats.load_exceptions <= stats.misses);
        prop_assert_eq!(stats.load_exceptions, 0, "table loader never fails");
    }

    // For any operation sequence, a key the loader cannot resolve is never
    // present in the store afterwards.
    #[test]
    fn prop_no_negative_memoization(
        table in prop::collection::vec((key_strategy(), value_strategy()), 0..10),
        probes in prop::collection::vec(key_strategy(), 1..40)
    ) {
        let known: Vec<String> = table.iter().map(|(k, _)| k.clone()).collect();
        let loader = TableLoader::new(table);
        let loader_dyn: Arc<dyn ValueLoader> = loader;
        let store = EntryStore::new(0, None);

        run(async {
            for key in &probes {
                let _ = store.get(key, &loader_dyn).await;
            }
        });

        for key in store.keys() {
            prop_assert!(known.contains(&key), "key '{}' memoized without a source row", key);
        }
    }

    // For any lookup sequence, the entry count never exceeds the bound.
    #[test]
    fn prop_bounded_size(
        table in prop::collection::vec((key_strategy(), value_strategy()), 1..120),
        probes in prop::collection::vec(key_strategy(), 1..200)
    ) {
        let loader = TableLoader::new(table);
        let loader_dyn: Arc<dyn ValueLoader> = loader;
        let store = EntryStore::new(TEST_MAX_SIZE, None);

        run(async {
            for key in &probes {
                let _ = store.get(key, &loader_dyn).await;
                assert!(store.size() <= TEST_MAX_SIZE);
            }
        });

        prop_assert!(store.size() <= TEST_MAX_SIZE);
    }

    // For any entry set, literal filtering keeps exactly the entries that
    // contain the needle, and the matched count is reported before the cap.
    #[test]
    fn prop_snapshot_filter_matches_substring(
        pairs in prop::collection::vec((key_strategy(), value_strategy()), 0..30),
        needle in "[a-f0-9]{1,2}",
        limit in 0usize..10
    ) {
        let entries: Vec<CacheEntry> = pairs
            .iter()
            .enumerate()
            .map(|(i, (k, v))| CacheEntry {
                key: format!("{}-{}", k, i),
                value: v.clone(),
                loaded_at_millis: i as u64,
                access_count: i as u64,
            })
            .collect();
        let expected = entries
            .iter()
            .filter(|e| e.key.to_lowercase().contains(&needle.to_lowercase()))
            .count() as u64;

        let query = SnapshotQuery {
            limit,
            filter: Some(needle.clone()),
            filter_scope: FilterScope::Key,
            ..Default::default()
        };
        let (filtered, matched) = apply(entries, &query).unwrap();

        prop_assert_eq!(matched, expected);
        if limit > 0 {
            prop_assert!(filtered.len() <= limit);
        } else {
            prop_assert_eq!(filtered.len() as u64, matched);
        }
        for entry in &filtered {
            prop_assert!(entry.key.to_lowercase().contains(&needle.to_lowercase()));
        }
    }

    // For any entry set, sorting yields a monotone sequence in the chosen
    // direction.
    #[test]
    fn prop_snapshot_sort_is_monotone(
        pairs in prop::collection::vec((key_strategy(), value_strategy(), 0u64..1000), 0..30),
        descending in any::<bool>()
    ) {
        let entries: Vec<CacheEntry> = pairs
            .iter()
            .enumerate()
            .map(|(i, (k, v, stamp))| CacheEntry {
                key: format!("{}-{}", k, i),
                value: v.clone(),
                loaded_at_millis: *stamp,
                access_count: 0,
            })
            .collect();

        let query = SnapshotQuery {
            limit: 0,
            sort_by: SortField::LoadedAt,
            sort_dir: if descending { SortDir::Desc } else { SortDir::Asc },
            ..Default::default()
        };
        let (sorted, _) = apply(entries, &query).unwrap();

        for window in sorted.windows(2) {
            if descending {
                prop_assert!(window[0].loaded_at_millis >= window[1].loaded_at_millis);
            } else {
                prop_assert!(window[0].loaded_at_millis <= window[1].loaded_at_millis);
            }
        }
    }
}
