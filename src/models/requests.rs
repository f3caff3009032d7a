//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::definition::CacheDefinition;

fn default_enabled() -> bool {
    true
}

fn default_max_connections() -> u32 {
    1
}

// == Definition Request ==
/// Body for creating or updating a cache definition. The id is taken from
/// the route (or generated on create), never from the body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRequest {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub driver: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub query: String,
    #[serde(default)]
    pub key_column: Option<String>,
    pub value_column: String,
    #[serde(default)]
    pub max_size: u64,
    #[serde(default)]
    pub eviction_minutes: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DefinitionRequest {
    /// Binds the payload to an id, producing the definition the engine and
    /// repository work with.
    pub fn into_definition(self, id: String) -> CacheDefinition {
        CacheDefinition {
            id,
            name: self.name,
            enabled: self.enabled,
            driver: self.driver,
            url: self.url,
            username: self.username,
            password: self.password,
            query: self.query,
            key_column: self.key_column,
            value_column: self.value_column,
            max_size: self.max_size,
            eviction_minutes: self.eviction_minutes,
            max_connections: self.max_connections,
        }
    }
}

// == Test Query Request ==
/// Body for the inline query test: a definition plus the sample key to bind.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestQueryRequest {
    pub definition: DefinitionRequest,
    pub sample_key: String,
}
