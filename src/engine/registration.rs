//! Registration Module
//!
//! The live bundle of one cache's in-memory state. A registration is
//! immutable after publication; re-registering a definition builds a whole
//! new bundle and swaps it in, it never mutates an existing one.

use std::sync::Arc;

use crate::db::ConnectionPool;
use crate::definition::CacheDefinition;
use crate::store::{EntryStore, ValueLoader};

// == Registration ==
/// Everything the engine holds for one registered cache.
///
/// The loader captures the pool and a definition snapshot of its own, so
/// loads in flight when a registration is replaced finish against the
/// resources they started with.
pub struct Registration {
    /// Defensive snapshot of the definition this bundle was built from
    pub definition: CacheDefinition,
    pub store: EntryStore,
    pub pool: Arc<ConnectionPool>,
    pub loader: Arc<dyn ValueLoader>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.definition.id)
            .field("name", &self.definition.name)
            .field("pool", &self.pool)
            .finish()
    }
}
