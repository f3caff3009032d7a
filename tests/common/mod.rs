//! Shared test support: an in-memory driver standing in for the external
//! database, plus builders for engines and app state wired to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use query_cache::api::AppState;
use query_cache::db::{ConnectOptions, DbConnection, Driver, DriverRegistry, RowSet};
use query_cache::error::{CacheError, Result};
use query_cache::repo::DefinitionRepository;
use query_cache::{CacheDefinition, CacheEngine, FacadeSink, GlobalVariableStore};

// == Stub Table ==
/// Mutable key/value table served by the stub driver, with counters for
/// asserting how often the "database" was touched.
#[derive(Default)]
pub struct StubTable {
    rows: Mutex<HashMap<String, Option<String>>>,
    pub queries: AtomicU64,
    pub connects: AtomicU64,
    pub fail_queries: AtomicBool,
    pub fail_connects: AtomicBool,
    query_delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl StubTable {
    pub fn with_rows(pairs: &[(&str, &str)]) -> Arc<Self> {
        let table = Self::default();
        {
            let mut rows = table.rows.lock().unwrap();
            for (key, value) in pairs {
                rows.insert(key.to_string(), Some(value.to_string()));
            }
        }
        Arc::new(table)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.rows
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(value.to_string()));
    }

    /// Inserts a row whose value column is SQL NULL.
    pub fn set_null(&self, key: &str) {
        self.rows.lock().unwrap().insert(key.to_string(), None);
    }

    pub fn remove(&self, key: &str) {
        self.rows.lock().unwrap().remove(key);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

// == Stub Driver ==
/// Driver whose connections answer from the shared table. Result sets carry
/// the columns `key` and `value`.
pub struct StubDriver {
    table: Arc<StubTable>,
}

impl StubDriver {
    pub fn new(table: Arc<StubTable>) -> Self {
        Self { table }
    }
}

struct StubConnection {
    table: Arc<StubTable>,
}

#[async_trait]
impl Driver for StubDriver {
    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn DbConnection>> {
        if self.table.fail_connects.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("connection refused".to_string()));
        }
        self.table.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            table: Arc::clone(&self.table),
        }))
    }
}

#[async_trait]
impl DbConnection for StubConnection {
    async fn query(&mut self, _sql: &str, param: &str) -> Result<RowSet> {
        self.table.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.table.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.table.fail_queries.load(Ordering::SeqCst) {
            return Err(CacheError::Query("table unavailable".to_string()));
        }
        let rows = match self.table.rows.lock().unwrap().get(param) {
            Some(value) => vec![vec![Some(param.to_string()), value.clone()]],
            None => vec![],
        };
        Ok(RowSet {
            columns: vec!["key".to_string(), "value".to_string()],
            rows,
        })
    }

    async fn is_valid(&mut self, _timeout: Duration) -> bool {
        !self.table.fail_connects.load(Ordering::SeqCst)
    }
}

// == Builders ==

#[allow(dead_code)]
pub fn stub_engine(table: Arc<StubTable>) -> (Arc<CacheEngine>, Arc<GlobalVariableStore>) {
    let mut registry = DriverRegistry::new();
    registry.register("stub", Arc::new(StubDriver::new(table)) as Arc<dyn Driver>);
    let variables = Arc::new(GlobalVariableStore::new());
    let engine = CacheEngine::new(
        Arc::new(registry),
        Arc::clone(&variables) as Arc<dyn FacadeSink>,
        Duration::from_secs(5),
    );
    (engine, variables)
}

#[allow(dead_code)]
pub fn stub_state(table: Arc<StubTable>) -> AppState {
    let (engine, variables) = stub_engine(table);
    AppState::new(engine, Arc::new(DefinitionRepository::new()), variables)
}

#[allow(dead_code)]
pub fn stub_definition(id: &str, name: &str) -> CacheDefinition {
    CacheDefinition {
        id: id.to_string(),
        name: name.to_string(),
        enabled: true,
        driver: "stub".to_string(),
        url: "stub://table".to_string(),
        username: String::new(),
        password: String::new(),
        query: "SELECT value FROM t WHERE key = ?".to_string(),
        key_column: Some("key".to_string()),
        value_column: "value".to_string(),
        max_size: 0,
        eviction_minutes: 0,
        max_connections: 2,
    }
}
