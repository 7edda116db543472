//! `esg-bonds` library crate.
//!
//! The binary (`esg`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes
//! - a dashboard or notebook front-end can consume [`domain::DataSet`] directly

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod extract;
pub mod io;
pub mod logging;
pub mod normalize;
pub mod report;
