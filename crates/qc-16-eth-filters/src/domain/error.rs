//! Filter error types with JSON-RPC 2.0 error codes.

use crate::domain::config::ConfigError;
use crate::domain::types::FilterId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard JSON-RPC 2.0 error codes
pub mod codes {
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
}

/// Errors returned by filter operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// No filter is registered under the id (never created, uninstalled or expired).
    #[error("filter not found: {0}")]
    NotFound(FilterId),

    /// Log criteria are self-contradictory.
    #[error("invalid filter criteria: {0}")]
    InvalidCriteria(String),

    /// The filter id could not be parsed.
    #[error("invalid filter id: {0}")]
    InvalidId(String),
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// JSON-RPC error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Invalid parameters
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }

    /// Internal error
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }

    /// Filter missing, uninstalled or expired.
    ///
    /// The message is fixed; the id travels in `data`.
    pub fn filter_not_found(id: &FilterId) -> Self {
        Self::with_data(
            codes::SERVER_ERROR,
            "filter not found",
            serde_json::json!({ "id": id.to_string() }),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::NotFound(id) => ApiError::filter_not_found(&id),
            FilterError::InvalidCriteria(reason) => ApiError::invalid_params(reason),
            FilterError::InvalidId(raw) => {
                ApiError::invalid_params(format!("invalid filter id {raw:?}"))
            }
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while assembling or running the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A worker pool could not be built
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// The tracing subscriber could not be installed
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// The service was started twice
    #[error("service already started")]
    AlreadyStarted,
}

impl From<rayon::ThreadPoolBuildError> for PipelineError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        PipelineError::ThreadPool(e.to_string())
    }
}
