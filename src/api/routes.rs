//! API Routes
//!
//! Configures the Axum router with all cache administration endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    all_statistics, cache_snapshot, cache_statistics, create_definition, delete_definition,
    get_definition, health_handler, list_definitions, refresh_cache, test_connection,
    test_connection_inline, test_query_inline, update_definition, AppState,
};

/// Creates the admin router with all endpoints configured.
///
/// # Endpoints
/// - `GET /definitions` - List cache definitions
/// - `POST /definitions` - Create a definition and register it when enabled
/// - `GET /definitions/:id` - Fetch one definition
/// - `PUT /definitions/:id` - Update a definition and swap its registration
/// - `DELETE /definitions/:id` - Unregister and delete a definition
/// - `POST /definitions/:id/refresh` - Reload every cached key
/// - `POST /definitions/:id/testConnection` - Probe the stored connection
/// - `GET /definitions/:id/statistics` - Statistics for one cache
/// - `GET /definitions/:id/snapshot` - Filtered, sorted entry listing
/// - `POST /testConnectionInline` - Probe an unsaved definition
/// - `POST /testQueryInline` - Run an unsaved definition's query once
/// - `GET /statistics` - Statistics for every registered cache
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/definitions", get(list_definitions).post(create_definition))
        .route(
            "/definitions/:id",
            get(get_definition)
                .put(update_definition)
                .delete(delete_definition),
        )
        .route("/definitions/:id/refresh", post(refresh_cache))
        .route("/definitions/:id/testConnection", post(test_connection))
        .route("/definitions/:id/statistics", get(cache_statistics))
        .route("/definitions/:id/snapshot", get(cache_snapshot))
        .route("/testConnectionInline", post(test_connection_inline))
        .route("/testQueryInline", post(test_query_inline))
        .route("/statistics", get(all_statistics))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
