//! Domain types and logic of the filter subsystem.
//!
//! Synchronous core: filters and their registry, the receipt aggregation
//! state machine and the filter manager. Async plumbing lives in `ipc`.

pub mod aggregator;
pub mod config;
pub mod criteria;
pub mod error;
pub mod filter;
pub mod finalize;
pub mod manager;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use aggregator::{Anomaly, CycleEvent, CycleState, Outcome, Phase, ReceiptAggregator};
pub use config::{ConfigError, FilterConfig, DEFAULT_FILTER_TIMEOUT};
pub use criteria::{LogCriteria, MAX_TOPICS};
pub use error::{ApiError, ApiResult, FilterError, PipelineError};
pub use filter::{Deadline, Expiry, Filter, Interest};
pub use finalize::finalize_receipts;
pub use manager::{FilterManager, Settlement};
pub use registry::{spawn_eviction, FilterRegistry, RegistryStats};
pub use types::*;
