//! Error conversions from infrastructure types.

use crate::domain::ApiError;
use crate::ports::BackendError;

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::QueryTooLarge(msg) => ApiError::with_data(
                crate::domain::error::codes::SERVER_ERROR,
                "query returned too many results",
                serde_json::json!({ "reason": msg }),
            ),
            other => ApiError::internal(other.to_string()),
        }
    }
}
