//! Shared pipeline runs used by the CLI commands.
//!
//! Keeping the workflow here lets each command focus on presentation:
//! resolve (remote -> cache) -> extract -> normalize -> DataSet.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{HttpSource, RemoteSource, Resolution, SourceResolver};
use crate::domain::{DataSet, DatasetKind, Provenance, SourceDescriptor};
use crate::error::{AppError, PipelineError};
use crate::extract::{ContentKind, TableSelector, extract_table};
use crate::normalize::normalize;

/// Per-dataset outcome of one load, in request order.
#[derive(Debug)]
pub struct LoadOutput {
    pub results: Vec<(DatasetKind, Result<Resolution, PipelineError>)>,
}

impl LoadOutput {
    pub fn resolved(&self) -> impl Iterator<Item = &Resolution> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved().count()
    }

    /// The resolution for `kind`, if it was requested.
    pub fn get(&self, kind: DatasetKind) -> Option<&Result<Resolution, PipelineError>> {
        self.results.iter().find(|(k, _)| *k == kind).map(|(_, r)| r)
    }
}

/// Resolve `kinds` against the live HTTP source and the cache directory.
pub fn load_datasets(config: &PipelineConfig, kinds: &[DatasetKind]) -> Result<LoadOutput, AppError> {
    let remote = HttpSource::new(config.http_timeout)?;
    Ok(load_with(config, remote, kinds))
}

/// Same as [`load_datasets`] with any remote source.
pub fn load_with<R: RemoteSource>(config: &PipelineConfig, remote: R, kinds: &[DatasetKind]) -> LoadOutput {
    let resolver = SourceResolver::new(config, remote);
    let results = resolver.resolve_all(kinds);
    info!(
        requested = kinds.len(),
        resolved = results.iter().filter(|(_, r)| r.is_ok()).count(),
        "load finished"
    );
    LoadOutput { results }
}

/// Extract and normalize one local file.
pub fn normalize_file(
    path: &Path,
    kind: DatasetKind,
    selector: &TableSelector,
    drop_threshold: f64,
) -> Result<DataSet, AppError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::new(4, format!("Failed to read input `{}`: {e}", path.display())))?;

    let origin = SourceDescriptor::Local {
        path: path.to_path_buf(),
    };
    let table = extract_table(&content, ContentKind::for_path(path), selector, &origin)?;
    let dataset = normalize(
        &table,
        kind,
        Provenance::File {
            path: path.to_path_buf(),
        },
        drop_threshold,
    )?;
    Ok(dataset)
}
