//! Polling filter methods (eth_newFilter family).

use crate::domain::criteria::LogCriteria;
use crate::domain::registry::FilterRegistry;
use crate::domain::types::{FilterChanges, FilterId};
use crate::domain::{ApiResult, FilterError};
use crate::ports::LogBackend;
use shared_types::entities::Log;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Filter RPC methods handler
#[derive(Clone)]
pub struct FilterApi {
    registry: Arc<FilterRegistry>,
    backend: Arc<dyn LogBackend>,
}

impl FilterApi {
    pub fn new(registry: Arc<FilterRegistry>, backend: Arc<dyn LogBackend>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// eth_newFilter - Installs a log filter
    #[instrument(skip(self, criteria))]
    pub fn new_filter(&self, criteria: LogCriteria) -> ApiResult<FilterId> {
        criteria.validate()?;
        Ok(self.registry.new_log_filter(criteria))
    }

    /// eth_newBlockFilter - Installs a filter for new block hashes
    #[instrument(skip(self))]
    pub fn new_block_filter(&self) -> ApiResult<FilterId> {
        Ok(self.registry.new_block_filter())
    }

    /// eth_newPendingTransactionFilter - Installs a filter for new pending
    /// transaction hashes
    #[instrument(skip(self))]
    pub fn new_pending_transaction_filter(&self) -> ApiResult<FilterId> {
        Ok(self.registry.new_pending_transaction_filter())
    }

    /// eth_uninstallFilter - Removes a filter
    #[instrument(skip(self))]
    pub fn uninstall_filter(&self, id: &str) -> ApiResult<bool> {
        let id = parse_id(id)?;
        Ok(self.registry.uninstall(&id))
    }

    /// eth_getFilterChanges - Returns everything buffered since the last poll
    #[instrument(skip(self))]
    pub fn get_filter_changes(&self, id: &str) -> ApiResult<FilterChanges> {
        let id = parse_id(id)?;
        Ok(self.registry.drain(&id)?)
    }

    /// eth_getFilterLogs - Returns all stored logs matching a log filter
    ///
    /// Does not consume the buffer nor extend the filter's lifetime.
    #[instrument(skip(self))]
    pub async fn get_filter_logs(&self, id: &str) -> ApiResult<Vec<Log>> {
        let id = parse_id(id)?;
        let criteria = self.registry.log_criteria(&id)?;
        let logs = self.backend.get_logs(&criteria).await?;
        debug!(filter_id = %id, logs = logs.len(), "Fetched filter logs");
        Ok(logs)
    }
}

fn parse_id(raw: &str) -> Result<FilterId, FilterError> {
    raw.parse()
}
