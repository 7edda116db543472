//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the logical datasets and their column contracts (`DatasetKind`, `Schema`)
//! - typed rows (`BondRecord`, `ImpactRecord`)
//! - the validated `DataSet` plus its provenance

pub mod types;

pub use types::*;
