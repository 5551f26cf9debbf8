//! IPC module: event bus integration.
//!
//! The aggregator and the filter manager consume the shared event bus
//! through the workers defined here.

pub mod bus_adapter;

pub use bus_adapter::{aggregator_filter, manager_filter, AggregatorWorker, FilterManagerWorker};
