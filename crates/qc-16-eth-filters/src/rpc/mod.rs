//! RPC method handlers for the filter JSON-RPC methods.

pub mod filters;

pub use filters::FilterApi;
