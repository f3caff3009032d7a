//! Lookup Facade Module
//!
//! The handle channel code uses to read from a cache by name, and the sink
//! the engine publishes those handles into. The sink stands in for the
//! host's script variable store; the engine only needs put and remove.

use std::collections::HashMap;
use std::sync::{RwLock, Weak};

use crate::engine::CacheEngine;
use crate::error::{CacheError, Result};

// == Cache Lookup ==
/// Per-cache lookup handle.
///
/// Holds the engine weakly: once the engine is shut down and dropped, a
/// facade that somehow survived reports the cache as unknown instead of
/// keeping the engine alive.
#[derive(Clone)]
pub struct CacheLookup {
    engine: Weak<CacheEngine>,
    name: String,
}

impl CacheLookup {
    pub(crate) fn new(engine: Weak<CacheEngine>, name: String) -> Self {
        Self { engine, name }
    }

    /// The cache name this facade is bound to.
    pub fn cache_name(&self) -> &str {
        &self.name
    }

    // == Lookup ==
    /// Returns the cached value for `key`, or None when the external source
    /// has no mapping.
    pub async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| CacheError::UnknownCache(self.name.clone()))?;
        engine.lookup_by_name(&self.name, key).await
    }
}

impl std::fmt::Debug for CacheLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLookup").field("name", &self.name).finish()
    }
}

// == Facade Sink ==
/// Where lookup facades are published for channel code to find.
pub trait FacadeSink: Send + Sync {
    fn put(&self, name: &str, facade: CacheLookup);
    fn remove(&self, name: &str);
}

// == Global Variable Store ==
/// In-process implementation of the facade sink: a name-keyed map the host
/// exposes to channel code.
#[derive(Default)]
pub struct GlobalVariableStore {
    entries: RwLock<HashMap<String, CacheLookup>>,
}

impl GlobalVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the facade registered under `name`.
    pub fn get(&self, name: &str) -> Option<CacheLookup> {
        self.read().get(name).cloned()
    }

    /// Names with a published facade, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheLookup>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheLookup>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FacadeSink for GlobalVariableStore {
    fn put(&self, name: &str, facade: CacheLookup) {
        self.write().insert(name.to_string(), facade);
    }

    fn remove(&self, name: &str) {
        self.write().remove(name);
    }
}
