//! History module for uptrail.
//!
//! Keeps per-service and per-endpoint status series in a single JSON file.

mod models;
mod store;

pub use models::*;
pub use store::*;
