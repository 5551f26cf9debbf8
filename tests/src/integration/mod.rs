//! Cross-component integration tests.

pub mod filter_pipeline;
pub mod stress;
