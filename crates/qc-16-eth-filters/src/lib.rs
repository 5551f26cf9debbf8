// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! QC-16 Eth Filters - block event ingestion and polling filters for the
//! JSON-RPC gateway.
//!
//! Serves `eth_newFilter`, `eth_newBlockFilter`,
//! `eth_newPendingTransactionFilter`, `eth_getFilterChanges`,
//! `eth_getFilterLogs` and `eth_uninstallFilter`.
//!
//! # Architecture
//!
//! ```text
//!          Event Bus
//!              │
//!   receipts, inclusion lists, completions
//!              ▼
//! ┌──────────────────────────┐
//! │    Receipt Aggregator    │  Init → Collecting → Done
//! └────────────┬─────────────┘
//!              │ SelectedReceipts
//!              ▼
//! ┌──────────────────────────┐  ◀── completions, pending blocks,
//! │      Filter Manager      │      pending transactions
//! │  (join + finalize, rayon)│
//! └────────────┬─────────────┘
//!              │ broadcast
//!              ▼
//! ┌──────────────────────────┐       ┌─────────────┐
//! │     Filter Registry      │ ◀──── │  FilterApi  │ ◀── clients
//! │  (DashMap, TTL eviction) │       └──────┬──────┘
//! └──────────────────────────┘              │ get_logs
//!                                           ▼
//!                                      LogBackend
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use qc_16_eth_filters::{FilterConfig, FilterService, InMemoryLogStore};
//!
//! let mut service = FilterService::standalone(
//!     FilterConfig::default(),
//!     Arc::new(InMemoryLogStore::new()),
//! )?;
//! service.start()?;
//!
//! let id = service.api().new_block_filter()?;
//! let changes = service.api().get_filter_changes(&id.to_string())?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod rpc;
pub mod service;
pub mod telemetry;

// Re-exports
pub use adapters::InMemoryLogStore;
pub use domain::{
    ApiError, ApiResult, FilterChanges, FilterConfig, FilterError, FilterId, FilterKind,
    FilterRegistry, LogCriteria, PipelineError, ReceiptAggregator,
};
pub use ports::{BackendError, LogBackend};
pub use rpc::FilterApi;
pub use service::FilterService;
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
