//! # Core Domain Entities
//!
//! Defines the block-ingestion entities exchanged between the gateway
//! components.
//!
//! ## Clusters
//!
//! - **Execution output**: `Receipt`, `Log`
//! - **Block assembly**: `InclusionList`, `PendingBlock`, `BlockCompletion`
//! - **Aggregation output**: `SelectedReceipts`

use serde::{Deserialize, Serialize};

pub use primitive_types::{H160, H256, U256};

// =============================================================================
// CLUSTER A: PRIMITIVES
// =============================================================================

/// A 32-byte hash (block hash, transaction hash, log topic).
pub type Hash = H256;

/// A 20-byte Ethereum-style address.
pub type Address = H160;

/// Block height.
pub type BlockNumber = u64;

// =============================================================================
// CLUSTER B: EXECUTION OUTPUT
// =============================================================================

/// An event log emitted during transaction execution.
///
/// The block linkage fields (`block_hash`, `block_number`, `transaction_hash`,
/// `transaction_index`, `log_index`) are zero until the block is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics (up to 4).
    pub topics: Vec<Hash>,
    /// Non-indexed data.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Height of the block containing the log.
    pub block_number: BlockNumber,
    /// Hash of the block containing the log.
    pub block_hash: Hash,
    /// Hash of the transaction that emitted the log.
    pub transaction_hash: Hash,
    /// Position of the emitting transaction in the block.
    pub transaction_index: u64,
    /// Position of the log in the block.
    pub log_index: u64,
    /// True when the log was removed by a reorg.
    pub removed: bool,
}

impl Log {
    /// Creates an unlinked log.
    #[must_use]
    pub fn new(address: Address, topics: Vec<Hash>, data: Vec<u8>) -> Self {
        Self {
            address,
            topics,
            data,
            ..Self::default()
        }
    }
}

/// A transaction receipt as produced by execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the transaction.
    pub transaction_hash: Hash,
    /// Position of the transaction in the finalized block.
    pub transaction_index: u64,
    /// Hash of the finalized block.
    pub block_hash: Hash,
    /// Height of the finalized block.
    pub block_number: BlockNumber,
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Created contract address, if any.
    pub contract_address: Option<Address>,
    /// Gas used by this transaction alone.
    pub gas_used: u64,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// 1 = success, 0 = failure.
    pub status: u8,
    /// Logs emitted by the transaction.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Creates a successful receipt for `transaction_hash` carrying `logs`.
    #[must_use]
    pub fn new(transaction_hash: Hash, logs: Vec<Log>) -> Self {
        Self {
            transaction_hash,
            status: 1,
            logs,
            ..Self::default()
        }
    }
}

// =============================================================================
// CLUSTER C: BLOCK ASSEMBLY
// =============================================================================

/// The authoritative, ordered list of transactions finalized into a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionList {
    /// Block height.
    pub height: BlockNumber,
    /// Consensus round that produced the list.
    pub round: u64,
    /// Transaction hashes in block order.
    pub tx_hashes: Vec<Hash>,
}

/// Descriptor of the block being proposed at a height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBlock {
    /// Block hash.
    pub hash: Hash,
    /// Block height.
    pub height: BlockNumber,
}

/// Outcome of committing a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// The block was committed.
    Success,
    /// The block was not committed.
    Failed(String),
}

impl CompletionStatus {
    /// True for [`CompletionStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Signal that processing of a block has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCompletion {
    /// Block height.
    pub height: BlockNumber,
    /// Commit outcome.
    pub status: CompletionStatus,
}

impl BlockCompletion {
    /// A successful completion at `height`.
    #[must_use]
    pub fn success(height: BlockNumber) -> Self {
        Self {
            height,
            status: CompletionStatus::Success,
        }
    }

    /// A failed completion at `height`.
    #[must_use]
    pub fn failed(height: BlockNumber, reason: impl Into<String>) -> Self {
        Self {
            height,
            status: CompletionStatus::Failed(reason.into()),
        }
    }
}

// =============================================================================
// CLUSTER D: AGGREGATION OUTPUT
// =============================================================================

/// Receipts of one block reduced to, and ordered by, its inclusion list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedReceipts {
    /// Height of the inclusion list.
    pub height: BlockNumber,
    /// Round of the inclusion list.
    pub round: u64,
    /// Receipts in inclusion-list order.
    pub receipts: Vec<Receipt>,
}

/// Hex serialization for byte payloads (`"0x..."`).
mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(|_| de::Error::custom("invalid hex bytes"))
    }
}
