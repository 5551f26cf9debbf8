//! Log filter criteria and matching.
//!
//! Matching runs in two stages. A block is first selected either by exact
//! block hash or by the inclusive `[fromBlock, toBlock]` range; only logs of a
//! selected block are then tested against the address and topic sets.

use crate::domain::error::FilterError;
use crate::domain::types::{BlockSpec, FilterAddress, FilterTopic};
use serde::{Deserialize, Serialize};
use shared_types::entities::{BlockNumber, Hash, Log};

/// Maximum number of topic positions a log can carry.
pub const MAX_TOPICS: usize = 4;

/// Criteria of a Logs filter (`eth_newFilter` parameter object).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCriteria {
    /// Exact block hash (alternative to from_block/to_block)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Hash>,
    /// From block (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_block: Option<BlockSpec>,
    /// To block (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<BlockSpec>,
    /// Contract addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<FilterAddress>,
    /// Positional topic sets (up to 4)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Option<FilterTopic>>>,
}

impl LogCriteria {
    /// Criteria matching an inclusive height range.
    pub fn range(from: BlockNumber, to: BlockNumber) -> Self {
        Self {
            from_block: Some(BlockSpec::Number(from)),
            to_block: Some(BlockSpec::Number(to)),
            ..Self::default()
        }
    }

    /// Criteria matching one block by hash.
    pub fn at_block_hash(hash: Hash) -> Self {
        Self {
            block_hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: FilterAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_topics(mut self, topics: Vec<Option<FilterTopic>>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Reject self-contradictory criteria.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.block_hash.is_some() && (self.from_block.is_some() || self.to_block.is_some()) {
            return Err(FilterError::InvalidCriteria(
                "blockHash cannot be combined with fromBlock/toBlock".into(),
            ));
        }

        if let (Some(from), Some(to)) = (self.lower_bound(), self.upper_bound()) {
            if from > to {
                return Err(FilterError::InvalidCriteria(format!(
                    "fromBlock {from} is greater than toBlock {to}"
                )));
            }
        }

        if let Some(topics) = &self.topics {
            if topics.len() > MAX_TOPICS {
                return Err(FilterError::InvalidCriteria(format!(
                    "{} topic positions given, at most {MAX_TOPICS} allowed",
                    topics.len()
                )));
            }
        }

        Ok(())
    }

    /// Lowest accepted height, `None` if unbounded.
    pub fn lower_bound(&self) -> Option<BlockNumber> {
        self.from_block.as_ref().and_then(BlockSpec::height)
    }

    /// Highest accepted height, `None` if unbounded.
    pub fn upper_bound(&self) -> Option<BlockNumber> {
        self.to_block.as_ref().and_then(BlockSpec::height)
    }

    /// Whether the logs of block (`height`, `block_hash`) are candidates.
    pub fn matches_block(&self, height: BlockNumber, block_hash: &Hash) -> bool {
        if let Some(wanted) = &self.block_hash {
            return wanted == block_hash;
        }

        if self.lower_bound().is_some_and(|from| height < from) {
            return false;
        }
        !self.upper_bound().is_some_and(|to| height > to)
    }

    /// Address and positional topic predicate.
    pub fn matches_log(&self, log: &Log) -> bool {
        if let Some(address) = &self.address {
            if !address.matches(&log.address) {
                return false;
            }
        }

        let Some(topics) = &self.topics else {
            return true;
        };

        if topics.len() > log.topics.len() {
            return false;
        }

        topics
            .iter()
            .zip(&log.topics)
            .all(|(wanted, actual)| wanted.as_ref().map_or(true, |t| t.matches(actual)))
    }

    /// Logs of block (`height`, `block_hash`) accepted by these criteria.
    pub fn filter_logs<'a, I>(&self, height: BlockNumber, block_hash: &Hash, logs: I) -> Vec<Log>
    where
        I: IntoIterator<Item = &'a Log>,
    {
        if !self.matches_block(height, block_hash) {
            return Vec::new();
        }
        logs.into_iter()
            .filter(|log| self.matches_log(log))
            .cloned()
            .collect()
    }
}
