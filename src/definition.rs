//! Cache Definition Module
//!
//! The operator-supplied record describing one named cache: its external
//! database connection, its parameterized lookup query, and its bounds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::ConnectOptions;
use crate::error::{CacheError, Result};

fn default_enabled() -> bool {
    true
}

fn default_max_connections() -> u32 {
    1
}

// == Cache Definition ==
/// Defines a named cache backed by an external database query.
///
/// The engine always works on its own copy of the definition; updating a
/// definition re-registers the cache rather than mutating live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDefinition {
    /// Stable identifier, unchanged across updates
    pub id: String,
    /// Unique human label; this is the identity channel code looks up by
    pub name: String,
    /// Disabled definitions are stored but never registered
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Driver name resolved against the driver registry
    pub driver: String,
    /// Connection URL for the external datasource
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Parameterized SQL with exactly one positional parameter bound to the
    /// lookup key; the text is executed verbatim
    pub query: String,
    /// Result column holding the key, only consulted by query tests
    #[serde(default)]
    pub key_column: Option<String>,
    /// Result column holding the value, matched case-insensitively
    pub value_column: String,
    /// Maximum entries; 0 means unbounded
    #[serde(default)]
    pub max_size: u64,
    /// Idle TTL measured from last access; 0 disables time eviction
    #[serde(default)]
    pub eviction_minutes: u64,
    /// Connection pool size, at least 1
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl CacheDefinition {
    // == Validation ==
    /// Checks the rules applied before registration and at the REST boundary.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::Validation("name must not be empty".to_string()));
        }
        if self.driver.trim().is_empty() {
            return Err(CacheError::Validation("driver must not be empty".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(CacheError::Validation("url must not be empty".to_string()));
        }
        if self.query.trim().is_empty() {
            return Err(CacheError::Validation("query must not be empty".to_string()));
        }
        if self.value_column.trim().is_empty() {
            return Err(CacheError::Validation(
                "valueColumn must not be empty".to_string(),
            ));
        }
        if self.max_connections < 1 {
            return Err(CacheError::Validation(
                "maxConnections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    // == Idle TTL ==
    /// Returns the access TTL as a duration, or None when time eviction is
    /// disabled.
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.eviction_minutes > 0).then(|| Duration::from_secs(self.eviction_minutes * 60))
    }

    // == Connect Options ==
    /// Connection parameters handed to the driver.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
