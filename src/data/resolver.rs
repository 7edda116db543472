//! Source resolution: live page first, cache second, `DataUnavailable` last.
//!
//! Rules:
//! - at most one remote fetch per call; a failure falls straight through to the cache
//! - a usable cache younger than the validity window skips the network entirely
//! - a successful fetch that normalizes cleanly overwrites the cache file
//! - remote problems are returned as [`SourceWarning`]s next to the dataset,
//!   never as errors

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::domain::{DataSet, DatasetKind, Provenance, SourceDescriptor};
use crate::error::PipelineError;
use crate::extract::{ContentKind, TableSelector, extract_table};
use crate::io::cache::{is_fresh, read_cache, write_dataset_csv};
use crate::normalize::normalize;

use super::remote::RemoteSource;

/// Non-fatal problem met while resolving a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceWarning {
    pub dataset: DatasetKind,
    /// URL or path the warning is about.
    pub source: String,
    pub message: String,
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.dataset, self.message, self.source)
    }
}

/// A resolved dataset plus whatever went wrong on the way.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub dataset: DataSet,
    pub warnings: Vec<SourceWarning>,
}

impl Resolution {
    /// Served from cache after a remote attempt failed.
    pub fn is_stale_fallback(&self) -> bool {
        self.dataset.provenance().is_cached() && !self.warnings.is_empty()
    }
}

pub struct SourceResolver<'a, R: RemoteSource> {
    config: &'a PipelineConfig,
    remote: R,
    selectors: BTreeMap<DatasetKind, TableSelector>,
}

impl<'a, R: RemoteSource> SourceResolver<'a, R> {
    pub fn new(config: &'a PipelineConfig, remote: R) -> Self {
        Self {
            config,
            remote,
            selectors: config.selectors.clone(),
        }
    }

    /// Override the table selector used on `kind`'s remote page.
    pub fn with_selector(mut self, kind: DatasetKind, selector: TableSelector) -> Self {
        self.selectors.insert(kind, selector);
        self
    }

    fn selector(&self, kind: DatasetKind) -> TableSelector {
        self.selectors.get(&kind).cloned().unwrap_or_default()
    }

    /// Resolve one logical dataset.
    pub fn resolve(&self, kind: DatasetKind) -> Result<Resolution, PipelineError> {
        let cache_path = self.config.cache_path(kind);
        let mut warnings = Vec::new();
        let mut reasons = Vec::new();

        let url = match self.config.remote_url(kind) {
            None => {
                reasons.push("no remote source configured".to_string());
                None
            }
            Some(_) if self.config.offline => {
                info!(dataset = %kind, "offline mode, skipping remote fetch");
                reasons.push("offline mode".to_string());
                None
            }
            Some(url) => Some(url),
        };

        let Some(url) = url else {
            let dataset = self.load_cache(kind, &mut reasons)?;
            info!(dataset = %kind, rows = dataset.len(), provenance = %dataset.provenance(), "resolved from cache");
            return Ok(Resolution { dataset, warnings });
        };

        // A fresh cache is served as is; an unusable one still gets the remote attempt.
        let mut cache_failure = None;
        if !self.config.force_refresh && is_fresh(&cache_path, self.config.cache_ttl, SystemTime::now()) {
            info!(dataset = %kind, path = %cache_path.display(), "cache within validity window, skipping remote fetch");
            match self.load_cache(kind, &mut Vec::new()) {
                Ok(dataset) => return Ok(Resolution { dataset, warnings }),
                Err(e) => {
                    warn!(dataset = %kind, path = %cache_path.display(), error = %e, "fresh cache unusable, trying remote");
                    warnings.push(SourceWarning {
                        dataset: kind,
                        source: cache_path.display().to_string(),
                        message: format!("cache unusable: {e}"),
                    });
                    cache_failure = Some(e);
                }
            }
        }

        match self.fetch_remote(kind, url) {
            Ok(dataset) => {
                if let Err(e) = write_dataset_csv(&cache_path, &dataset) {
                    warn!(dataset = %kind, error = %e, "failed to update cache");
                    warnings.push(SourceWarning {
                        dataset: kind,
                        source: cache_path.display().to_string(),
                        message: format!("cache not updated: {e}"),
                    });
                } else {
                    info!(dataset = %kind, path = %cache_path.display(), rows = dataset.len(), "cache updated");
                }
                return Ok(Resolution { dataset, warnings });
            }
            Err(message) => {
                warn!(dataset = %kind, url, error = %message, "remote fetch failed, falling back to cache");
                reasons.push(message.clone());
                warnings.push(SourceWarning {
                    dataset: kind,
                    source: url.to_string(),
                    message,
                });
            }
        }

        // The cache was already tried and failed; report that failure with the remote reason.
        if let Some(err) = cache_failure {
            return Err(match err {
                PipelineError::DataUnavailable {
                    dataset,
                    reasons: cache_reasons,
                } => PipelineError::DataUnavailable {
                    dataset,
                    reasons: reasons.into_iter().chain(cache_reasons).collect(),
                },
                other => other,
            });
        }

        let dataset = self.load_cache(kind, &mut reasons)?;
        info!(dataset = %kind, rows = dataset.len(), provenance = %dataset.provenance(), "resolved from cache");
        Ok(Resolution { dataset, warnings })
    }

    /// Resolve several datasets independently; one failing never stops the others.
    pub fn resolve_all(
        &self,
        kinds: &[DatasetKind],
    ) -> Vec<(DatasetKind, Result<Resolution, PipelineError>)> {
        kinds.iter().map(|&kind| (kind, self.resolve(kind))).collect()
    }

    /// One fetch, one extraction, one normalization. Any failure is a message.
    fn fetch_remote(&self, kind: DatasetKind, url: &str) -> Result<DataSet, String> {
        let doc = self.remote.fetch(url).map_err(|e| e.to_string())?;
        let origin = SourceDescriptor::Remote {
            url: doc.url.clone(),
            retrieved_at: doc.fetched_at,
        };
        let table = extract_table(&doc.body, ContentKind::Html, &self.selector(kind), &origin)
            .map_err(|e| e.to_string())?;
        let provenance = Provenance::Remote {
            url: doc.url,
            fetched_at: doc.fetched_at,
        };
        normalize(&table, kind, provenance, self.config.drop_threshold).map_err(|e| e.to_string())
    }

    fn load_cache(&self, kind: DatasetKind, reasons: &mut Vec<String>) -> Result<DataSet, PipelineError> {
        let path = self.config.cache_path(kind);
        let unavailable = |reasons: &mut Vec<String>, reason: String| {
            reasons.push(reason);
            PipelineError::DataUnavailable {
                dataset: kind.name().to_string(),
                reasons: std::mem::take(reasons),
            }
        };

        let cached = match read_cache(&path) {
            Ok(Some(cached)) => cached,
            Ok(None) => {
                return Err(unavailable(reasons, format!("no cache file at {}", path.display())));
            }
            Err(e) => return Err(unavailable(reasons, e.to_string())),
        };

        let origin = SourceDescriptor::Local { path: path.clone() };
        let table = match extract_table(
            &cached.content,
            ContentKind::for_path(&path),
            &TableSelector::default(),
            &origin,
        ) {
            Ok(t) => t,
            // Nothing left to fall back to.
            Err(e) => return Err(unavailable(reasons, e.to_string())),
        };

        let provenance = Provenance::Cache {
            path,
            modified: cached.modified,
        };
        normalize(&table, kind, provenance, self.config.drop_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::tempdir;

    use crate::data::remote::RemoteDocument;
    use crate::error::FetchError;

    const PAGE: &str = "<html><body><table>\
        <tr><th>Year</th><th>Issuer</th><th>Amount (Cr INR)</th><th>Use of Proceeds</th></tr>\
        <tr><td>2023</td><td>IRFC</td><td>2,000</td><td>Rail</td></tr>\
        <tr><td>2024</td><td>NTPC</td><td>1,500</td><td>Solar</td></tr>\
        </table></body></html>";

    const CACHED: &str = "Year,Issuer,Amount (Cr INR),Use of Proceeds\n\
        2019,IREDA,1500,Renewable Energy\n\
        2020,SBI,5000,Clean Transport\n";

    /// Remote double that counts calls and replays one canned outcome.
    struct FakeRemote {
        body: Option<String>,
        timeout: bool,
        calls: Cell<usize>,
    }

    impl FakeRemote {
        fn serving(body: impl Into<String>) -> Self {
            Self { body: Some(body.into()), timeout: false, calls: Cell::new(0) }
        }

        fn failing() -> Self {
            Self { body: None, timeout: false, calls: Cell::new(0) }
        }

        fn timing_out() -> Self {
            Self { body: None, timeout: true, calls: Cell::new(0) }
        }
    }

    impl RemoteSource for &FakeRemote {
        fn fetch(&self, url: &str) -> Result<RemoteDocument, FetchError> {
            self.calls.set(self.calls.get() + 1);
            match &self.body {
                Some(body) => Ok(RemoteDocument {
                    url: url.to_string(),
                    body: body.clone(),
                    fetched_at: Utc::now(),
                }),
                None if self.timeout => Err(FetchError::Timeout { url: url.to_string() }),
                None => Err(FetchError::Transport {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            cache_dir: dir.to_path_buf(),
            green_bonds_url: Some("https://example.test/greenbonds.html".to_string()),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn fetch_failure_with_cache_returns_cache_and_warning() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.force_refresh = true;
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), CACHED).unwrap();

        let remote = FakeRemote::failing();
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();

        assert_eq!(remote.calls.get(), 1, "exactly one remote attempt");
        assert_eq!(res.dataset.len(), 2);
        assert!(res.dataset.provenance().is_cached());
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].message.contains("connection refused"));
        assert!(res.is_stale_fallback());
    }

    #[test]
    fn fetch_failure_without_cache_is_unavailable() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let remote = FakeRemote::failing();

        let err = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap_err();
        match err {
            PipelineError::DataUnavailable { dataset, reasons } => {
                assert_eq!(dataset, "green_bonds");
                assert_eq!(reasons.len(), 2);
                assert!(reasons[1].starts_with("no cache file"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(remote.calls.get(), 1);
    }

    #[test]
    fn successful_fetch_persists_cache() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let remote = FakeRemote::serving(PAGE);

        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert!(res.warnings.is_empty());
        assert!(matches!(res.dataset.provenance(), Provenance::Remote { .. }));
        assert_eq!(res.dataset.len(), 2);

        let written = fs::read_to_string(cfg.cache_path(DatasetKind::GreenBonds)).unwrap();
        assert_eq!(
            written,
            "Year,Issuer,Amount (Cr INR),Use of Proceeds,Coupon (%)\n2023,IRFC,2000,Rail,\n2024,NTPC,1500,Solar,\n"
        );

        // Second resolution within the window never touches the network.
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 1);
        assert!(res.dataset.provenance().is_cached());
        assert_eq!(res.dataset.records().len(), 2);
    }

    #[test]
    fn timeout_falls_back_to_cache_with_warning() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.force_refresh = true;
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), CACHED).unwrap();

        let remote = FakeRemote::timing_out();
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 1);
        assert_eq!(res.dataset.len(), 2);
        assert!(res.is_stale_fallback());
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].message.contains("timed out"), "{}", res.warnings[0]);
    }

    #[test]
    fn fresh_but_malformed_cache_is_replaced_from_remote() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let cache = cfg.cache_path(DatasetKind::GreenBonds);
        fs::write(&cache, "Name,Value\nfoo,1\n").unwrap();
        assert!(is_fresh(&cache, cfg.cache_ttl, SystemTime::now()));

        let remote = FakeRemote::serving(PAGE);
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 1, "exactly one remote attempt");
        assert!(matches!(res.dataset.provenance(), Provenance::Remote { .. }));
        assert_eq!(res.dataset.len(), 2);
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].message.starts_with("cache unusable"));

        let rewritten = fs::read_to_string(&cache).unwrap();
        assert!(rewritten.starts_with("Year,Issuer,Amount (Cr INR)"));

        // The repaired cache now serves without another fetch.
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 1);
        assert!(res.dataset.provenance().is_cached());
    }

    #[test]
    fn fresh_malformed_cache_and_failed_remote_reports_cache_error() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), "Name,Value\nfoo,1\n").unwrap();

        let remote = FakeRemote::failing();
        let err = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap_err();
        assert_eq!(remote.calls.get(), 1);
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));

        // Unreadable fresh content: the remote reason is kept next to the cache one.
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), "\n\n").unwrap();
        let err = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap_err();
        match err {
            PipelineError::DataUnavailable { reasons, .. } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn configured_selector_applies_to_remote_pages() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.selectors.insert(DatasetKind::GreenBonds, TableSelector::signature_for(DatasetKind::GreenBonds));
        let page = format!("<table><tr><th>Menu</th></tr><tr><td>Home</td></tr></table>{PAGE}");
        let remote = FakeRemote::serving(page);

        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(res.dataset.len(), 2);
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn expired_cache_triggers_refetch() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cache_ttl = Duration::ZERO;
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), CACHED).unwrap();

        let remote = FakeRemote::serving(PAGE);
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 1);
        assert_eq!(res.dataset.bonds().next().unwrap().issuer, "IRFC");
    }

    #[test]
    fn offline_mode_reads_cache_only() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.offline = true;
        cfg.force_refresh = true;
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), CACHED).unwrap();

        let remote = FakeRemote::serving(PAGE);
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(remote.calls.get(), 0);
        assert!(res.warnings.is_empty());
        assert!(!res.is_stale_fallback());
    }

    #[test]
    fn unparsable_remote_page_falls_back() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.force_refresh = true;
        fs::write(cfg.cache_path(DatasetKind::GreenBonds), CACHED).unwrap();

        let remote = FakeRemote::serving("<html><p>Site under maintenance</p></html>");
        let res = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds).unwrap();
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].message.contains("no table found"));
        assert_eq!(res.dataset.len(), 2);

        // The cache was not overwritten by the failed refresh.
        let cached = fs::read_to_string(cfg.cache_path(DatasetKind::GreenBonds)).unwrap();
        assert_eq!(cached, CACHED);
    }

    #[test]
    fn header_signature_selector_skips_layout_tables() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let page = format!("<table><tr><th>Menu</th></tr><tr><td>Home</td></tr></table>{PAGE}");
        let remote = FakeRemote::serving(page);

        let positional = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::GreenBonds);
        assert!(matches!(positional, Err(PipelineError::DataUnavailable { .. })));

        let res = SourceResolver::new(&cfg, &remote)
            .with_selector(DatasetKind::GreenBonds, TableSelector::signature_for(DatasetKind::GreenBonds))
            .resolve(DatasetKind::GreenBonds)
            .unwrap();
        assert_eq!(res.dataset.len(), 2);
    }

    #[test]
    fn corrupt_cache_schema_is_reported_as_mismatch() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        fs::write(cfg.cache_path(DatasetKind::SocialBonds), "Issuer,Use Case\nNABARD,Housing\n").unwrap();

        let remote = FakeRemote::failing();
        let err = SourceResolver::new(&cfg, &remote).resolve(DatasetKind::SocialBonds).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
        assert_eq!(remote.calls.get(), 0, "social bonds have no remote source");
    }

    #[test]
    fn datasets_resolve_independently() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        fs::write(
            cfg.cache_path(DatasetKind::ImpactMetrics),
            "Year,Metric,CO2 Saved (tons),Renewable Capacity (MW)\n2021,Solar,1000,50\n",
        )
        .unwrap();

        let remote = FakeRemote::failing();
        let results = SourceResolver::new(&cfg, &remote).resolve_all(&DatasetKind::ALL);
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap().dataset.len(), 1);
    }
}
