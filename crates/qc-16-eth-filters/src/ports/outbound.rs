//! Outbound ports for the filter subsystem.

use crate::domain::criteria::LogCriteria;
use async_trait::async_trait;
use shared_types::entities::Log;

/// Errors raised by a log store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("log store unavailable: {0}")]
    Unavailable(String),
    #[error("query too large: {0}")]
    QueryTooLarge(String),
    #[error("log store error: {0}")]
    Internal(String),
}

/// Historical log lookup used by `eth_getFilterLogs`.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// All stored logs matching `criteria`, in chain order.
    async fn get_logs(&self, criteria: &LogCriteria) -> Result<Vec<Log>, BackendError>;
}
