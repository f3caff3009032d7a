//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::responses::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its admin API.
///
/// All variants carry plain strings so a failure can be cloned to every
/// caller waiting on the same in-flight load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Definition rejected before use
    #[error("Invalid definition: {0}")]
    Validation(String),

    /// No cache registered for the given id or name
    #[error("Unknown cache: {0}")]
    UnknownCache(String),

    /// Another registration already binds the name
    #[error("Duplicate cache name: {0}")]
    DuplicateName(String),

    /// The driver could not open or keep a connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The pool could not honor a borrow within its timeout
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    Query(String),

    /// A configured result column is not present in the result set
    #[error("Column not found: {0}")]
    ColumnMissing(String),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Prefixes the message with the owning cache name so failures seen by
    /// channel code identify which cache produced them.
    pub fn in_cache(self, cache_name: &str) -> Self {
        let wrap = |msg: String| format!("cache '{}': {}", cache_name, msg);
        match self {
            CacheError::Connection(msg) => CacheError::Connection(wrap(msg)),
            CacheError::PoolExhausted(msg) => CacheError::PoolExhausted(wrap(msg)),
            CacheError::Query(msg) => CacheError::Query(wrap(msg)),
            CacheError::ColumnMissing(msg) => CacheError::ColumnMissing(wrap(msg)),
            other => other,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::UnknownCache(_) => StatusCode::NOT_FOUND,
            CacheError::DuplicateName(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
