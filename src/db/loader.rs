//! Query Loader Module
//!
//! Executes a cache's parameterized query for one key and maps the result
//! set onto the read-through contract: a value, an explicit absence, or a
//! failure that is never memoized.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::db::pool::ConnectionPool;
use crate::definition::CacheDefinition;
use crate::error::{CacheError, Result};
use crate::store::ValueLoader;

// == Query Loader ==
/// Read-through loader bound to one registration's definition and pool.
///
/// The loader captures a snapshot of the query configuration, so loads that
/// are already in flight keep using the definition and pool they started
/// with even if the cache is re-registered underneath them.
pub struct QueryLoader {
    cache_name: String,
    query: String,
    value_column: String,
    pool: Arc<ConnectionPool>,
}

impl QueryLoader {
    pub fn new(definition: &CacheDefinition, pool: Arc<ConnectionPool>) -> Self {
        Self {
            cache_name: definition.name.clone(),
            query: definition.query.clone(),
            value_column: definition.value_column.clone(),
            pool,
        }
    }
}

#[async_trait]
impl ValueLoader for QueryLoader {
    /// Borrows one connection, runs the query, and releases the connection
    /// on every exit path.
    ///
    /// Zero rows resolve to `None`. A row whose value column is SQL NULL
    /// also resolves to `None`: a mapping to nothing is indistinguishable
    /// from no mapping, and memoizing it as an empty string would pin the
    /// wrong answer.
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self
            .pool
            .borrow()
            .await
            .map_err(|e| e.in_cache(&self.cache_name))?;

        let rows = match connection.query(&self.query, key).await {
            Ok(rows) => rows,
            Err(err) => {
                // A failed statement may have wedged the connection
                connection.invalidate();
                return Err(err.in_cache(&self.cache_name));
            }
        };

        if rows.rows.is_empty() {
            debug!(cache = %self.cache_name, key, "no row for key");
            return Ok(None);
        }

        let Some(index) = rows.column_index(&self.value_column) else {
            return Err(CacheError::ColumnMissing(format!(
                "column '{}' not in result set (available: {})",
                self.value_column,
                rows.columns.join(", ")
            ))
            .in_cache(&self.cache_name));
        };

        Ok(rows.rows[0].get(index).cloned().flatten())
    }
}
