//! Error types.
//!
//! Two layers:
//!
//! - [`PipelineError`] and friends are the typed failures of the data pipeline.
//!   They are what library callers match on.
//! - [`AppError`] is the binary-level error: a message plus a process exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::SourceDescriptor;

/// Typed failure of one dataset resolution.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// No usable source at all.
    #[error("dataset `{dataset}` is unavailable: {}", .reasons.join("; "))]
    DataUnavailable { dataset: String, reasons: Vec<String> },

    /// The source was reachable but its content could not be turned into a table.
    #[error("extraction failed for {origin} (selector: {selector}): {reason}")]
    ExtractionFailed {
        selector: String,
        origin: SourceDescriptor,
        reason: String,
    },

    /// The table was parsed but does not satisfy the dataset's schema.
    #[error(
        "schema mismatch for `{dataset}`: missing [{}], dropped {dropped}/{total} rows ({:.1}%)",
        .missing.join(", "),
        .drop_rate * 100.0
    )]
    SchemaMismatch {
        dataset: String,
        missing: Vec<String>,
        drop_rate: f64,
        dropped: usize,
        total: usize,
    },
}

/// Failure of a single remote fetch. Never fatal on its own.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("response from {url} could not be decoded: {message}")]
    Body { url: String, message: String },
}

/// Failure reading or replacing a cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache CSV on '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let code = match err {
            PipelineError::DataUnavailable { .. } => 4,
            PipelineError::ExtractionFailed { .. } | PipelineError::SchemaMismatch { .. } => 3,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::new(4, err.to_string())
    }
}
