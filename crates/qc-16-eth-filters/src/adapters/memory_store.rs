//! In-memory log store.
//!
//! Keeps every appended log in chain order. Used by hosts without a
//! persistent index and by tests.

use crate::domain::criteria::LogCriteria;
use crate::ports::{BackendError, LogBackend};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::entities::{Log, Receipt};

/// Default cap on the number of logs a single query may return.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

pub struct InMemoryLogStore {
    logs: RwLock<Vec<Log>>,
    max_results: usize,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::with_max_results(DEFAULT_MAX_RESULTS)
    }

    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            logs: RwLock::new(Vec::new()),
            max_results,
        }
    }

    /// Append the logs of finalized receipts.
    pub fn append_receipts(&self, receipts: &[Receipt]) {
        let mut logs = self.logs.write();
        logs.extend(receipts.iter().flat_map(|r| r.logs.iter().cloned()));
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogBackend for InMemoryLogStore {
    async fn get_logs(&self, criteria: &LogCriteria) -> Result<Vec<Log>, BackendError> {
        let logs = self.logs.read();
        let matched: Vec<Log> = logs
            .iter()
            .filter(|log| criteria.matches_block(log.block_number, &log.block_hash))
            .filter(|log| criteria.matches_log(log))
            .cloned()
            .collect();

        if matched.len() > self.max_results {
            return Err(BackendError::QueryTooLarge(format!(
                "{} logs, limit {}",
                matched.len(),
                self.max_results
            )));
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::{Address, Hash};

    fn receipt(height: u64, address: u8) -> Receipt {
        let mut log = Log::new(Address::repeat_byte(address), vec![], vec![]);
        log.block_number = height;
        Receipt::new(Hash::from_low_u64_be(height), vec![log])
    }

    #[tokio::test]
    async fn test_get_logs_by_range() {
        let store = InMemoryLogStore::new();
        store.append_receipts(&[receipt(1, 1), receipt(2, 1), receipt(3, 2)]);

        let logs = store.get_logs(&LogCriteria::range(2, 3)).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].block_number, 2);
    }

    #[tokio::test]
    async fn test_result_limit() {
        let store = InMemoryLogStore::with_max_results(1);
        store.append_receipts(&[receipt(1, 1), receipt(2, 1)]);

        let err = store.get_logs(&LogCriteria::default()).await.unwrap_err();
        assert!(matches!(err, BackendError::QueryTooLarge(_)));
    }
}
