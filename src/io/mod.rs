//! Input/output helpers.
//!
//! - cache file read/write and freshness checks (`cache`)

pub mod cache;

pub use cache::*;
