//! Adapters for the filter subsystem.
//!
//! Infrastructure implementations of the outbound ports.

mod error_conversions;
pub mod memory_store;

pub use memory_store::InMemoryLogStore;
