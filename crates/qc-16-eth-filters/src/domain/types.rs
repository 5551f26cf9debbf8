//! Core filter types with Ethereum JSON-RPC serialization.

use crate::domain::error::FilterError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use shared_types::entities::{Address, BlockNumber, Hash, Log};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque filter identifier.
///
/// Backed by a random v4 UUID and rendered as `0x` followed by 32 lowercase
/// hex digits. Ids are unpredictable, never sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(Uuid);

impl FilterId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0.simple())
    }
}

impl FromStr for FilterId {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| FilterError::InvalidId(s.to_string()))?;

        if digits.len() != 32 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FilterError::InvalidId(s.to_string()));
        }

        Uuid::parse_str(digits)
            .map(Self)
            .map_err(|_| FilterError::InvalidId(s.to_string()))
    }
}

impl Serialize for FilterId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilterId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Kind of a filter, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    Logs,
    Block,
    PendingTransaction,
}

/// Block tags for JSON-RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Latest => "latest",
            BlockTag::Earliest => "earliest",
            BlockTag::Pending => "pending",
            BlockTag::Safe => "safe",
            BlockTag::Finalized => "finalized",
        }
    }
}

impl FromStr for BlockTag {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "latest" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            "pending" => Ok(BlockTag::Pending),
            "safe" => Ok(BlockTag::Safe),
            "finalized" => Ok(BlockTag::Finalized),
            _ => Err("invalid block tag"),
        }
    }
}

/// A `fromBlock` / `toBlock` bound: an explicit height or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSpec {
    Number(BlockNumber),
    Tag(BlockTag),
}

impl BlockSpec {
    /// Concrete height of this bound.
    ///
    /// `earliest` is height 0. Tags that follow the chain head (`latest`,
    /// `pending`, `safe`, `finalized`) have no fixed height and leave the
    /// range open on that side.
    pub fn height(&self) -> Option<BlockNumber> {
        match self {
            BlockSpec::Number(n) => Some(*n),
            BlockSpec::Tag(BlockTag::Earliest) => Some(0),
            BlockSpec::Tag(_) => None,
        }
    }
}

impl From<BlockNumber> for BlockSpec {
    fn from(n: BlockNumber) -> Self {
        BlockSpec::Number(n)
    }
}

impl Serialize for BlockSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            BlockSpec::Number(n) => serializer.serialize_str(&format!("0x{n:x}")),
            BlockSpec::Tag(tag) => serializer.serialize_str(tag.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for BlockSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BlockSpecVisitor;

        impl<'de> de::Visitor<'de> for BlockSpecVisitor {
            type Value = BlockSpec;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex quantity, a number or a block tag")
            }

            fn visit_str<E>(self, value: &str) -> Result<BlockSpec, E>
            where
                E: de::Error,
            {
                if let Some(hex_str) = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                {
                    u64::from_str_radix(hex_str, 16)
                        .map(BlockSpec::Number)
                        .map_err(|_| de::Error::custom("invalid hex block number"))
                } else if let Ok(tag) = BlockTag::from_str(value) {
                    Ok(BlockSpec::Tag(tag))
                } else {
                    value
                        .parse::<u64>()
                        .map(BlockSpec::Number)
                        .map_err(|_| de::Error::custom("invalid block number or tag"))
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<BlockSpec, E>
            where
                E: de::Error,
            {
                Ok(BlockSpec::Number(value))
            }
        }

        deserializer.deserialize_any(BlockSpecVisitor)
    }
}

/// Filter address - single or multiple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterAddress {
    Single(Address),
    Multiple(Vec<Address>),
}

impl FilterAddress {
    /// An empty address list matches every address.
    pub fn matches(&self, address: &Address) -> bool {
        match self {
            FilterAddress::Single(a) => a == address,
            FilterAddress::Multiple(addrs) => addrs.is_empty() || addrs.contains(address),
        }
    }
}

/// Filter topic - single or multiple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterTopic {
    Single(Hash),
    Multiple(Vec<Hash>),
}

impl FilterTopic {
    /// An empty alternative set matches every topic.
    pub fn matches(&self, topic: &Hash) -> bool {
        match self {
            FilterTopic::Single(t) => t == topic,
            FilterTopic::Multiple(ts) => ts.is_empty() || ts.contains(topic),
        }
    }
}

/// Unread results of a filter.
///
/// Serializes as a bare JSON array, as `eth_getFilterChanges` returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterChanges {
    /// Block hashes (Block) or transaction hashes (PendingTransaction).
    Hashes(Vec<Hash>),
    /// Matching logs (Logs).
    Logs(Vec<Log>),
}

impl FilterChanges {
    /// Empty buffer of the shape `kind` produces.
    pub fn empty(kind: FilterKind) -> Self {
        match kind {
            FilterKind::Logs => FilterChanges::Logs(Vec::new()),
            FilterKind::Block | FilterKind::PendingTransaction => {
                FilterChanges::Hashes(Vec::new())
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FilterChanges::Hashes(h) => h.len(),
            FilterChanges::Logs(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hashes, or `None` for a log buffer.
    pub fn as_hashes(&self) -> Option<&[Hash]> {
        match self {
            FilterChanges::Hashes(h) => Some(h),
            FilterChanges::Logs(_) => None,
        }
    }

    /// Logs, or `None` for a hash buffer.
    pub fn as_logs(&self) -> Option<&[Log]> {
        match self {
            FilterChanges::Logs(l) => Some(l),
            FilterChanges::Hashes(_) => None,
        }
    }
}
