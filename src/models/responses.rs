//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies. Statistics and
//! snapshots serialize their engine-side records directly; the types here
//! cover the remaining endpoints.

use serde::Serialize;

// == Delete Response ==
/// Acknowledgement for a deleted definition.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: String,
}

impl DeleteResponse {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message: format!("Cache definition '{}' deleted", id),
            id,
        }
    }
}

// == Refresh Response ==
/// Outcome of a blocking refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub message: String,
    pub failure_count: u64,
}

impl RefreshResponse {
    pub fn new(failure_count: u64) -> Self {
        let message = if failure_count == 0 {
            "Refresh completed".to_string()
        } else {
            format!("Refresh completed with {} failed key(s)", failure_count)
        };
        Self {
            message,
            failure_count,
        }
    }
}

// == Test Result Response ==
/// Display string produced by a connection or query test. Shown to the
/// operator verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct TestResultResponse {
    pub result: String,
}

impl TestResultResponse {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

// == Health Response ==
/// Body for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// == Error Response ==
/// Error body for all error conditions; every error leaving the API is
/// rendered through this shape.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
