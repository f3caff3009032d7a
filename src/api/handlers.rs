//! API Handlers
//!
//! HTTP request handlers for the cache administration endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::config::Config;
use crate::db::DriverRegistry;
use crate::engine::{CacheEngine, FacadeSink, GlobalVariableStore};
use crate::error::{CacheError, Result};
use crate::models::{
    DefinitionRequest, DeleteResponse, HealthResponse, RefreshResponse, TestQueryRequest,
    TestResultResponse,
};
use crate::repo::{DefinitionRecord, DefinitionRepository};
use crate::store::{CacheSnapshot, CacheStatistics, SnapshotQuery};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CacheEngine>,
    pub repo: Arc<DefinitionRepository>,
    pub variables: Arc<GlobalVariableStore>,
}

impl AppState {
    /// Creates state around an existing engine, repository, and variable
    /// store.
    pub fn new(
        engine: Arc<CacheEngine>,
        repo: Arc<DefinitionRepository>,
        variables: Arc<GlobalVariableStore>,
    ) -> Self {
        Self {
            engine,
            repo,
            variables,
        }
    }

    /// Builds a full stack from configuration: built-in drivers, an empty
    /// repository, and a fresh variable store.
    pub fn from_config(config: &Config) -> Self {
        let variables = Arc::new(GlobalVariableStore::new());
        let engine = CacheEngine::new(
            Arc::new(DriverRegistry::with_defaults()),
            Arc::clone(&variables) as Arc<dyn FacadeSink>,
            Duration::from_secs(config.borrow_timeout_secs),
        );
        Self::new(engine, Arc::new(DefinitionRepository::new()), variables)
    }
}

// == Definition CRUD ==

/// Handler for GET /definitions
pub async fn list_definitions(State(state): State<AppState>) -> Json<Vec<DefinitionRecord>> {
    Json(state.repo.list())
}

/// Handler for GET /definitions/:id
pub async fn get_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DefinitionRecord>> {
    state
        .repo
        .get(&id)
        .map(Json)
        .ok_or(CacheError::UnknownCache(id))
}

/// Handler for POST /definitions
///
/// Validates, stores, and (when enabled) registers the definition with the
/// engine.
pub async fn create_definition(
    State(state): State<AppState>,
    Json(request): Json<DefinitionRequest>,
) -> Result<Json<DefinitionRecord>> {
    let candidate = request.into_definition(String::new());
    candidate.validate()?;
    if state.repo.get_by_name(&candidate.name).is_some() {
        return Err(CacheError::DuplicateName(candidate.name));
    }

    let record = state.repo.create(candidate);
    if record.definition.enabled {
        state.engine.register(&record.definition).await?;
    }
    Ok(Json(record))
}

/// Handler for PUT /definitions/:id
///
/// Stores the updated definition, then swaps the live registration:
/// unregister the old bundle and register the new one when enabled.
pub async fn update_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DefinitionRequest>,
) -> Result<Json<DefinitionRecord>> {
    if state.repo.get(&id).is_none() {
        return Err(CacheError::UnknownCache(id));
    }

    let candidate = request.into_definition(id.clone());
    candidate.validate()?;
    if let Some(holder) = state.repo.get_by_name(&candidate.name) {
        if holder.definition.id != id {
            return Err(CacheError::DuplicateName(candidate.name));
        }
    }

    let record = state
        .repo
        .update(&id, candidate)
        .ok_or(CacheError::UnknownCache(id.clone()))?;

    state.engine.unregister(&id).await;
    if record.definition.enabled {
        state.engine.register(&record.definition).await?;
    }
    Ok(Json(record))
}

/// Handler for DELETE /definitions/:id
pub async fn delete_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.repo.get(&id).is_none() {
        return Err(CacheError::UnknownCache(id));
    }
    state.engine.unregister(&id).await;
    state.repo.delete(&id);
    Ok(Json(DeleteResponse::new(id)))
}

// == Engine Operations ==

/// Handler for POST /definitions/:id/refresh
///
/// Blocks until every currently cached key has been reloaded or failed.
pub async fn refresh_cache(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>> {
    let failures = state.engine.refresh(&id).await?;
    Ok(Json(RefreshResponse::new(failures)))
}

/// Handler for POST /definitions/:id/testConnection
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TestResultResponse>> {
    let record = state
        .repo
        .get(&id)
        .ok_or(CacheError::UnknownCache(id))?;
    let result = state.engine.test_connection(&record.definition).await;
    Ok(Json(TestResultResponse::new(result)))
}

/// Handler for POST /testConnectionInline
pub async fn test_connection_inline(
    State(state): State<AppState>,
    Json(request): Json<DefinitionRequest>,
) -> Json<TestResultResponse> {
    let definition = request.into_definition(String::new());
    let result = state.engine.test_connection(&definition).await;
    Json(TestResultResponse::new(result))
}

/// Handler for POST /testQueryInline
pub async fn test_query_inline(
    State(state): State<AppState>,
    Json(request): Json<TestQueryRequest>,
) -> Json<TestResultResponse> {
    let definition = request.definition.into_definition(String::new());
    let result = state
        .engine
        .test_query(&definition, &request.sample_key)
        .await;
    Json(TestResultResponse::new(result))
}

// == Inspection ==

/// Handler for GET /statistics
pub async fn all_statistics(State(state): State<AppState>) -> Json<Vec<CacheStatistics>> {
    Json(state.engine.all_statistics().await)
}

/// Handler for GET /definitions/:id/statistics
pub async fn cache_statistics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CacheStatistics>> {
    Ok(Json(state.engine.statistics(&id).await?))
}

/// Handler for GET /definitions/:id/snapshot
pub async fn cache_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<CacheSnapshot>> {
    Ok(Json(state.engine.snapshot(&id, &query).await?))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
