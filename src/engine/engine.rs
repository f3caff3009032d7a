//! Cache Engine Module
//!
//! The engine owns every registered cache: it builds the per-cache store,
//! pool, and loader from a definition, swaps registrations atomically, and
//! answers lookups, refreshes, snapshots, and statistics.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::db::{ConnectionPool, DriverRegistry, QueryLoader, RowSet};
use crate::definition::CacheDefinition;
use crate::engine::facade::{CacheLookup, FacadeSink};
use crate::engine::registration::Registration;
use crate::error::{CacheError, Result};
use crate::store::{
    apply_snapshot_query, CacheSnapshot, CacheStatistics, EntryStore, SnapshotQuery, ValueLoader,
};

/// How long a connection test waits for the database to answer.
const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

// == Cache Engine ==
/// Facade over all registered caches.
///
/// The registration map is the single synchronization point: readers clone
/// an `Arc<Registration>` out and work against that bundle, so a lookup
/// racing a re-registration completes against either the old bundle or the
/// new one, never a mix.
pub struct CacheEngine {
    me: Weak<CacheEngine>,
    drivers: Arc<DriverRegistry>,
    sink: Arc<dyn FacadeSink>,
    /// How long pool borrows wait for a free connection
    borrow_timeout: Duration,
    /// definition id -> live registration
    registrations: RwLock<HashMap<String, Arc<Registration>>>,
    /// cache name -> definition id
    names: RwLock<HashMap<String, String>>,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine publishing lookup facades into `sink`.
    pub fn new(
        drivers: Arc<DriverRegistry>,
        sink: Arc<dyn FacadeSink>,
        borrow_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            drivers,
            sink,
            borrow_timeout,
            registrations: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
        })
    }

    // == Register ==
    /// Builds and publishes a registration for `definition`, replacing any
    /// previous registration under the same id.
    ///
    /// The new bundle is visible before the old pool is closed, so queries
    /// already holding a connection finish on the pool they borrowed from
    /// while new lookups use the new one.
    pub async fn register(&self, definition: &CacheDefinition) -> Result<()> {
        definition.validate()?;
        let definition = definition.clone();

        let pool = Arc::new(ConnectionPool::new(
            &definition.name,
            Arc::clone(&self.drivers),
            definition.driver.clone(),
            definition.connect_options(),
            definition.max_connections,
            self.borrow_timeout,
        ));
        let store = EntryStore::new(definition.max_size, definition.idle_ttl());
        let loader: Arc<dyn ValueLoader> =
            Arc::new(QueryLoader::new(&definition, Arc::clone(&pool)));
        let registration = Arc::new(Registration {
            definition: definition.clone(),
            store,
            pool,
            loader,
        });

        let previous = {
            let mut registrations = self.registrations.write().await;
            let mut names = self.names.write().await;

            if let Some(owner) = names.get(&definition.name) {
                if owner != &definition.id {
                    return Err(CacheError::DuplicateName(definition.name.clone()));
                }
            }

            let previous = registrations.insert(definition.id.clone(), registration);

            if let Some(old) = &previous {
                let old_name = &old.definition.name;
                if old_name != &definition.name {
                    if names.get(old_name).is_some_and(|id| id == &definition.id) {
                        names.remove(old_name);
                    }
                    self.sink.remove(old_name);
                }
            }
            names.insert(definition.name.clone(), definition.id.clone());
            previous
        };

        self.sink.put(
            &definition.name,
            CacheLookup::new(self.me.clone(), definition.name.clone()),
        );

        if let Some(old) = previous {
            old.store.invalidate_all();
            old.pool.close();
            info!(cache = %definition.name, "re-registered cache");
        } else {
            info!(cache = %definition.name, "registered cache");
        }
        Ok(())
    }

    // == Unregister ==
    /// Removes the registration for `id`, if any, retracting its facade and
    /// closing its pool. Idempotent.
    pub async fn unregister(&self, id: &str) {
        let removed = {
            let mut registrations = self.registrations.write().await;
            let mut names = self.names.write().await;
            let removed = registrations.remove(id);
            if let Some(registration) = &removed {
                let name = &registration.definition.name;
                if names.get(name).is_some_and(|owner| owner == id) {
                    names.remove(name);
                }
            }
            removed
        };

        if let Some(registration) = removed {
            self.sink.remove(&registration.definition.name);
            registration.store.invalidate_all();
            registration.pool.close();
            info!(cache = %registration.definition.name, "unregistered cache");
        }
    }

    // == Lookup ==
    /// Reads a value through the cache registered under `id`.
    pub async fn lookup_by_id(&self, id: &str, key: &str) -> Result<Option<String>> {
        let registration = self.registration(id).await?;
        registration.store.get(key, &registration.loader).await
    }

    /// Reads a value through the cache registered under `name`.
    pub async fn lookup_by_name(&self, name: &str, key: &str) -> Result<Option<String>> {
        let id = {
            let names = self.names.read().await;
            names
                .get(name)
                .cloned()
                .ok_or_else(|| CacheError::UnknownCache(name.to_string()))?
        };
        self.lookup_by_id(&id, key).await
    }

    // == Refresh ==
    /// Reloads every key currently cached, without adding new keys.
    ///
    /// Blocks until every key present at the start has been reloaded or has
    /// failed. Returns the number of keys whose reload failed; a key whose
    /// source row disappeared simply drops out of the cache and does not
    /// count as a failure.
    pub async fn refresh(&self, id: &str) -> Result<u64> {
        let registration = self.registration(id).await?;
        let keys = registration.store.keys();
        let mut failures = 0u64;
        for key in &keys {
            registration.store.invalidate(key);
            if let Err(err) = registration.store.get(key, &registration.loader).await {
                warn!(cache = %registration.definition.name, key = %key, error = %err, "refresh failed for key");
                failures += 1;
            }
        }
        info!(
            cache = %registration.definition.name,
            keys = keys.len(),
            failures,
            "refreshed cache"
        );
        Ok(failures)
    }

    // == Snapshot ==
    /// Point-in-time view of a cache: statistics plus a filtered, sorted,
    /// capped entry listing.
    pub async fn snapshot(&self, id: &str, query: &SnapshotQuery) -> Result<CacheSnapshot> {
        let registration = self.registration(id).await?;
        let statistics = build_statistics(&registration);
        let collected = registration.store.snapshot_entries();
        let total_entries = collected.len() as u64;
        let (entries, matched_entries) = apply_snapshot_query(collected, query)?;
        Ok(CacheSnapshot {
            statistics,
            entries,
            total_entries,
            matched_entries,
        })
    }

    // == Statistics ==
    /// Statistics for one cache.
    pub async fn statistics(&self, id: &str) -> Result<CacheStatistics> {
        let registration = self.registration(id).await?;
        Ok(build_statistics(&registration))
    }

    /// Statistics for every registered cache, in unspecified order.
    pub async fn all_statistics(&self) -> Vec<CacheStatistics> {
        let registrations: Vec<Arc<Registration>> =
            self.registrations.read().await.values().cloned().collect();
        registrations.iter().map(|r| build_statistics(r)).collect()
    }

    // == Test Connection ==
    /// Opens a throwaway connection for `definition` and reports the result
    /// as a display string. Never fails; every outcome is rendered.
    pub async fn test_connection(&self, definition: &CacheDefinition) -> String {
        let Some(driver) = self.drivers.get(&definition.driver) else {
            return format!("Driver not found: {}", definition.driver);
        };
        match driver.connect(&definition.connect_options()).await {
            Ok(mut connection) => {
                if connection.is_valid(CONNECTION_TEST_TIMEOUT).await {
                    "Connection successful".to_string()
                } else {
                    "Connection returned but is not valid".to_string()
                }
            }
            Err(err) => format!("Connection failed: {}", raw_message(err)),
        }
    }

    // == Test Query ==
    /// Runs the definition's query once with `sample_key` and reports the
    /// result as a display string. Never fails; every outcome is rendered.
    pub async fn test_query(&self, definition: &CacheDefinition, sample_key: &str) -> String {
        let Some(driver) = self.drivers.get(&definition.driver) else {
            return format!("Driver not found: {}", definition.driver);
        };
        let mut connection = match driver.connect(&definition.connect_options()).await {
            Ok(connection) => connection,
            Err(err) => return format!("Query failed: {}", raw_message(err)),
        };
        let rows = match connection.query(&definition.query, sample_key).await {
            Ok(rows) => rows,
            Err(err) => return format!("Query failed: {}", raw_message(err)),
        };

        if rows.rows.is_empty() {
            return format!("No rows returned for key: {}", sample_key);
        }

        let mut missing = Vec::new();
        let value_index = rows.column_index(&definition.value_column);
        if value_index.is_none() {
            missing.push(definition.value_column.clone());
        }
        let key_index = match definition.key_column.as_deref().filter(|c| !c.is_empty()) {
            Some(column) => {
                let index = rows.column_index(column);
                if index.is_none() {
                    missing.push(column.to_string());
                }
                index
            }
            None => None,
        };
        if !missing.is_empty() {
            return format!(
                "Column(s) not found: {}. Available columns: {}",
                missing.join(", "),
                rows.columns.join(", ")
            );
        }

        let key_display = key_index
            .map(|index| render_cell(&rows, index))
            .unwrap_or_else(|| sample_key.to_string());
        let value_display = render_cell(&rows, value_index.unwrap_or_default());
        format!("Key: {} Value: {}", key_display, value_display)
    }

    // == Sweep Expired ==
    /// Evicts idle-expired entries across all caches. Returns the number of
    /// entries evicted.
    pub async fn sweep_expired(&self) -> u64 {
        let registrations: Vec<Arc<Registration>> =
            self.registrations.read().await.values().cloned().collect();
        registrations.iter().map(|r| r.store.sweep_expired()).sum()
    }

    // == Shutdown ==
    /// Invalidates every store, closes every pool, clears every map, and
    /// retracts every facade.
    pub async fn shutdown(&self) {
        let registrations: Vec<Arc<Registration>> = {
            let mut registrations = self.registrations.write().await;
            let mut names = self.names.write().await;
            names.clear();
            registrations.drain().map(|(_, r)| r).collect()
        };
        for registration in registrations {
            self.sink.remove(&registration.definition.name);
            registration.store.invalidate_all();
            registration.pool.close();
        }
        info!("cache engine shut down");
    }

    /// Count of live registrations.
    pub async fn registered_count(&self) -> usize {
        self.registrations.read().await.len()
    }

    async fn registration(&self, id: &str) -> Result<Arc<Registration>> {
        self.registrations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::UnknownCache(id.to_string()))
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine").finish_non_exhaustive()
    }
}

/// Assembles the derived statistics record for one registration.
fn build_statistics(registration: &Registration) -> CacheStatistics {
    CacheStatistics::from_counters(
        &registration.definition.id,
        &registration.definition.name,
        registration.store.size(),
        registration.store.estimated_memory_bytes(),
        &registration.store.stats(),
    )
}

/// First-row cell as display text, with SQL NULL rendered explicitly.
fn render_cell(rows: &RowSet, index: usize) -> String {
    rows.rows[0]
        .get(index)
        .cloned()
        .flatten()
        .unwrap_or_else(|| "NULL".to_string())
}

/// Inner message of an error, without the variant prefix, for the display
/// strings returned by the connection and query tests.
fn raw_message(err: CacheError) -> String {
    match err {
        CacheError::Validation(msg)
        | CacheError::UnknownCache(msg)
        | CacheError::DuplicateName(msg)
        | CacheError::Connection(msg)
        | CacheError::PoolExhausted(msg)
        | CacheError::Query(msg)
        | CacheError::ColumnMissing(msg)
        | CacheError::Internal(msg) => msg,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectOptions, DbConnection, Driver};
    use crate::engine::facade::GlobalVariableStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Driver over a shared, mutable key/value table.
    struct TableDriver {
        rows: Arc<Mutex<HashMap<String, Option<String>>>>,
        connects: AtomicU64,
        queries: Arc<AtomicU64>,
        fail_connect: AtomicBool,
    }

    struct TableConnection {
        rows: Arc<Mutex<HashMap<String, Option<String>>>>,
        queries: Arc<AtomicU64>,
    }

    impl TableDriver {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                rows: Arc::new(Mutex::new(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                        .collect(),
                )),
                connects: AtomicU64::new(0),
                queries: Arc::new(AtomicU64::new(0)),
                fail_connect: AtomicBool::new(false),
            })
        }

        fn set(&self, key: &str, value: &str) {
            self.rows
                .lock()
                .unwrap()
                .insert(key.to_string(), Some(value.to_string()));
        }

        fn remove(&self, key: &str) {
            self.rows.lock().unwrap().remove(key);
        }

        fn queries(&self) -> u64 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Driver for TableDriver {
        async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn DbConnection>> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(CacheError::Connection("connection refused".to_string()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TableConnection {
                rows: Arc::clone(&self.rows),
                queries: Arc::clone(&self.queries),
            }))
        }
    }

    #[async_trait]
    impl DbConnection for TableConnection {
        async fn query(&mut self, _sql: &str, param: &str) -> Result<RowSet> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let rows = match self.rows.lock().unwrap().get(param) {
                Some(value) => vec![vec![Some(param.to_string()), value.clone()]],
                None => vec![],
            };
            Ok(RowSet {
                columns: vec!["key".to_string(), "value".to_string()],
                rows,
            })
        }

        async fn is_valid(&mut self, _timeout: Duration) -> bool {
            true
        }
    }

    fn definition(id: &str, name: &str) -> CacheDefinition {
        CacheDefinition {
            id: id.to_string(),
            name: name.to_string(),
            enabled: true,
            driver: "table".to_string(),
            url: "table://".to_string(),
            username: String::new(),
            password: String::new(),
            query: "SELECT value FROM t WHERE key = $1".to_string(),
            key_column: Some("key".to_string()),
            value_column: "value".to_string(),
            max_size: 0,
            eviction_minutes: 0,
            max_connections: 2,
        }
    }

    fn engine_with(driver: Arc<TableDriver>) -> (Arc<CacheEngine>, Arc<GlobalVariableStore>) {
        let mut registry = DriverRegistry::new();
        registry.register("table", driver as Arc<dyn Driver>);
        let variables = Arc::new(GlobalVariableStore::new());
        let engine = CacheEngine::new(
            Arc::new(registry),
            Arc::clone(&variables) as Arc<dyn FacadeSink>,
            Duration::from_secs(5),
        );
        (engine, variables)
    }

    #[tokio::test]
    async fn test_register_publishes_name_and_facade() {
        let driver = TableDriver::new(&[("10001", "NY")]);
        let (engine, variables) = engine_with(driver);

        engine.register(&definition("id-1", "zip")).await.unwrap();

        let stats = engine.statistics("id-1").await.unwrap();
        assert_eq!(stats.name, "zip");
        assert!(variables.get("zip").is_some());

        engine.unregister("id-1").await;
        assert!(engine.statistics("id-1").await.is_err());
        assert!(variables.get("zip").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_across_ids() {
        let driver = TableDriver::new(&[]);
        let (engine, _) = engine_with(driver);

        engine.register(&definition("id-1", "zip")).await.unwrap();
        let err = engine.register(&definition("id-2", "zip")).await.unwrap_err();
        assert_eq!(err, CacheError::DuplicateName("zip".to_string()));
    }

    #[tokio::test]
    async fn test_rename_retracts_stale_name() {
        let driver = TableDriver::new(&[("10001", "NY")]);
        let (engine, variables) = engine_with(driver);

        engine.register(&definition("id-1", "zip")).await.unwrap();
        engine.register(&definition("id-1", "postal")).await.unwrap();

        assert!(variables.get("zip").is_none());
        assert!(variables.get("postal").is_some());
        assert!(engine.lookup_by_name("zip", "10001").await.is_err());
        assert_eq!(
            engine.lookup_by_name("postal", "10001").await.unwrap().as_deref(),
            Some("NY")
        );
    }

    #[tokio::test]
    async fn test_re_registration_closes_old_pool_and_resets_store() {
        let driver = TableDriver::new(&[("10001", "NY")]);
        let (engine, _) = engine_with(Arc::clone(&driver));

        engine.register(&definition("id-1", "zip")).await.unwrap();
        engine.lookup_by_name("zip", "10001").await.unwrap();
        let old_pool = {
            let registrations = engine.registrations.read().await;
            Arc::clone(&registrations.get("id-1").unwrap().pool)
        };

        engine.register(&definition("id-1", "zip")).await.unwrap();
        assert!(old_pool.is_closed());

        // The fresh store reloads on the next lookup
        assert_eq!(
            engine.lookup_by_name("zip", "10001").await.unwrap().as_deref(),
            Some("NY")
        );
        assert_eq!(driver.queries(), 2);
    }

    #[tokio::test]
    async fn test_lookup_unknown_cache() {
        let driver = TableDriver::new(&[]);
        let (engine, _) = engine_with(driver);

        assert!(matches!(
            engine.lookup_by_id("missing", "k").await,
            Err(CacheError::UnknownCache(_))
        ));
        assert!(matches!(
            engine.lookup_by_name("missing", "k").await,
            Err(CacheError::UnknownCache(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_reloads_current_keys_only() {
        let driver = TableDriver::new(&[("A", "1"), ("B", "2")]);
        let (engine, _) = engine_with(Arc::clone(&driver));

        engine.register(&definition("id-1", "codes")).await.unwrap();
        engine.lookup_by_id("id-1", "A").await.unwrap();
        engine.lookup_by_id("id-1", "B").await.unwrap();

        driver.set("A", "10");
        driver.set("B", "20");
        driver.set("C", "30");

        let failures = engine.refresh("id-1").await.unwrap();
        assert_eq!(failures, 0);

        let registration = engine.registration("id-1").await.unwrap();
        let mut keys = registration.store.keys();
        keys.sort();
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            engine.lookup_by_id("id-1", "A").await.unwrap().as_deref(),
            Some("10")
        );
        assert_eq!(
            engine.lookup_by_id("id-1", "B").await.unwrap().as_deref(),
            Some("20")
        );
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_keys_without_counting_failure() {
        let driver = TableDriver::new(&[("A", "1")]);
        let (engine, _) = engine_with(Arc::clone(&driver));

        engine.register(&definition("id-1", "codes")).await.unwrap();
        engine.lookup_by_id("id-1", "A").await.unwrap();

        driver.remove("A");
        let failures = engine.refresh("id-1").await.unwrap();
        assert_eq!(failures, 0);

        let registration = engine.registration("id-1").await.unwrap();
        assert!(!registration.store.contains("A"));
    }

    #[tokio::test]
    async fn test_refresh_unknown_cache() {
        let driver = TableDriver::new(&[]);
        let (engine, _) = engine_with(driver);
        assert!(matches!(
            engine.refresh("missing").await,
            Err(CacheError::UnknownCache(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_filters_and_sorts() {
        let driver = TableDriver::new(&[("10001", "NY"), ("60601", "IL"), ("94105", "CA")]);
        let (engine, _) = engine_with(driver);

        engine.register(&definition("id-1", "zip")).await.unwrap();
        for key in ["10001", "60601", "94105"] {
            engine.lookup_by_id("id-1", key).await.unwrap();
        }

        let query = SnapshotQuery {
            filter: Some("ny".to_string()),
            filter_scope: crate::store::FilterScope::Value,
            ..Default::default()
        };
        let snapshot = engine.snapshot("id-1", &query).await.unwrap();
        assert_eq!(snapshot.total_entries, 3);
        assert_eq!(snapshot.matched_entries, 1);
        assert_eq!(snapshot.entries[0].key, "10001");
        assert_eq!(snapshot.statistics.miss_count, 3);
    }

    #[tokio::test]
    async fn test_test_connection_outcomes() {
        let driver = TableDriver::new(&[]);
        let (engine, _) = engine_with(Arc::clone(&driver));

        let def = definition("id-1", "zip");
        assert_eq!(engine.test_connection(&def).await, "Connection successful");

        driver.fail_connect.store(true, Ordering::SeqCst);
        assert_eq!(
            engine.test_connection(&def).await,
            "Connection failed: connection refused"
        );

        let mut unknown = def.clone();
        unknown.driver = "oracle".to_string();
        assert_eq!(
            engine.test_connection(&unknown).await,
            "Driver not found: oracle"
        );
    }

    #[tokio::test]
    async fn test_test_query_outcomes() {
        let driver = TableDriver::new(&[("10001", "NY")]);
        let (engine, _) = engine_with(driver);
        let def = definition("id-1", "zip");

        assert_eq!(
            engine.test_query(&def, "10001").await,
            "Key: 10001 Value: NY"
        );
        assert_eq!(
            engine.test_query(&def, "99999").await,
            "No rows returned for key: 99999"
        );

        let mut wrong_column = def.clone();
        wrong_column.value_column = "state".to_string();
        assert_eq!(
            engine.test_query(&wrong_column, "10001").await,
            "Column(s) not found: state. Available columns: key, value"
        );
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let driver = TableDriver::new(&[("10001", "NY")]);
        let (engine, variables) = engine_with(driver);

        engine.register(&definition("id-1", "zip")).await.unwrap();
        engine.register(&definition("id-2", "postal")).await.unwrap();
        let pool = Arc::clone(&engine.registration("id-1").await.unwrap().pool);

        engine.shutdown().await;

        assert_eq!(engine.registered_count().await, 0);
        assert!(variables.names().is_empty());
        assert!(pool.is_closed());
        assert!(engine.lookup_by_name("zip", "10001").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected() {
        let driver = TableDriver::new(&[]);
        let (engine, _) = engine_with(driver);

        let mut def = definition("id-1", "zip");
        def.query = String::new();
        assert!(matches!(
            engine.register(&def).await,
            Err(CacheError::Validation(_))
        ));
    }
}
