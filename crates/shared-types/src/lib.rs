//! # Shared Types Crate
//!
//! Domain entities shared by the event-ingestion components: receipts, logs,
//! inclusion lists, pending blocks and block-completion signals.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-component types are defined here.
//! - **Serde everywhere**: Entities serialize with the camelCase field names
//!   clients see on the JSON-RPC surface.

pub mod entities;

pub use entities::*;
