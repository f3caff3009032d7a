//! Definition Repository Module
//!
//! In-memory table of cache definitions keyed by id. Stands in for the
//! host's definition storage; the engine itself only ever sees definitions
//! that have already been loaded from here.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::definition::CacheDefinition;

// == Definition Record ==
/// A stored definition with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    #[serde(flatten)]
    pub definition: CacheDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// == Definition Repository ==
/// Name-unique, id-keyed definition table.
#[derive(Debug, Default)]
pub struct DefinitionRepository {
    records: RwLock<HashMap<String, DefinitionRecord>>,
}

impl DefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // == List ==
    /// All records, ordered by name for stable listings.
    pub fn list(&self) -> Vec<DefinitionRecord> {
        let mut records: Vec<DefinitionRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.definition.name.cmp(&b.definition.name));
        records
    }

    // == Get ==
    pub fn get(&self, id: &str) -> Option<DefinitionRecord> {
        self.read().get(id).cloned()
    }

    /// Finds a record by cache name, for duplicate checks.
    pub fn get_by_name(&self, name: &str) -> Option<DefinitionRecord> {
        self.read()
            .values()
            .find(|record| record.definition.name == name)
            .cloned()
    }

    // == Create ==
    /// Stores a new definition, assigning an id when none was supplied.
    pub fn create(&self, mut definition: CacheDefinition) -> DefinitionRecord {
        if definition.id.trim().is_empty() {
            definition.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        let record = DefinitionRecord {
            definition,
            created_at: now,
            updated_at: now,
        };
        self.write()
            .insert(record.definition.id.clone(), record.clone());
        record
    }

    // == Update ==
    /// Replaces the definition stored under `id`, keeping its creation
    /// timestamp. Returns None when the id is unknown.
    pub fn update(&self, id: &str, mut definition: CacheDefinition) -> Option<DefinitionRecord> {
        definition.id = id.to_string();
        let mut records = self.write();
        let existing = records.get(id)?;
        let record = DefinitionRecord {
            definition,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        records.insert(id.to_string(), record.clone());
        Some(record)
    }

    // == Delete ==
    /// Removes the record under `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, DefinitionRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, DefinitionRecord>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
