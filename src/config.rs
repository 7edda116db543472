//! Pipeline configuration.
//!
//! Layering: built-in defaults, then environment variables (a `.env` file is
//! loaded first via `dotenvy`), then CLI overrides applied by `app`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::DatasetKind;
use crate::error::AppError;
use crate::extract::TableSelector;

/// SEBI's green bond statistics page.
pub const SEBI_GREEN_BONDS_URL: &str = "https://www.sebi.gov.in/statistics/greenbonds.html";

pub const DEFAULT_CACHE_DIR: &str = "data";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 3600);
pub const DEFAULT_DROP_THRESHOLD: f64 = 0.5;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding one `<dataset>.csv` cache file per logical dataset.
    pub cache_dir: PathBuf,
    /// Cache validity window. A younger cache file short-circuits the remote fetch.
    pub cache_ttl: Duration,
    /// Maximum tolerated fraction of rows dropped during coercion.
    pub drop_threshold: f64,
    pub http_timeout: Duration,
    /// Never touch the network.
    pub offline: bool,
    /// Ignore the validity window (still honours `offline`).
    pub force_refresh: bool,
    pub green_bonds_url: Option<String>,
    pub social_bonds_url: Option<String>,
    pub impact_metrics_url: Option<String>,
    /// Table selector per dataset for remote pages; first table when absent.
    pub selectors: BTreeMap<DatasetKind, TableSelector>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_ttl: DEFAULT_CACHE_TTL,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            offline: false,
            force_refresh: false,
            green_bonds_url: Some(SEBI_GREEN_BONDS_URL.to_string()),
            social_bonds_url: None,
            impact_metrics_url: None,
            selectors: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `ESG_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("ESG_CACHE_DIR").filter(|s| !s.trim().is_empty()) {
            config.cache_dir = PathBuf::from(dir.trim());
        }
        if let Some(v) = lookup("ESG_CACHE_TTL_HOURS") {
            config.cache_ttl =
                hours("ESG_CACHE_TTL_HOURS", parse_non_negative("ESG_CACHE_TTL_HOURS", &v)?)?;
        }
        if let Some(v) = lookup("ESG_DROP_THRESHOLD") {
            config.drop_threshold = parse_non_negative("ESG_DROP_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ESG_HTTP_TIMEOUT_SECS") {
            config.http_timeout =
                seconds("ESG_HTTP_TIMEOUT_SECS", parse_non_negative("ESG_HTTP_TIMEOUT_SECS", &v)?)?;
        }
        if let Some(v) = lookup("ESG_OFFLINE") {
            config.offline = parse_bool("ESG_OFFLINE", &v)?;
        }

        // An empty value disables the remote source for that dataset.
        if let Some(v) = lookup("ESG_GREEN_BONDS_URL") {
            config.green_bonds_url = non_empty(v);
        }
        if let Some(v) = lookup("ESG_SOCIAL_BONDS_URL") {
            config.social_bonds_url = non_empty(v);
        }
        if let Some(v) = lookup("ESG_IMPACT_METRICS_URL") {
            config.impact_metrics_url = non_empty(v);
        }

        for kind in DatasetKind::ALL {
            let key = selector_var(kind);
            if let Some(v) = lookup(&key) {
                let selector = TableSelector::parse(&v, kind)
                    .map_err(|e| AppError::new(2, format!("Invalid `{key}`: {e}")))?;
                config.selectors.insert(kind, selector);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.drop_threshold.is_finite() && (0.0..=1.0).contains(&self.drop_threshold)) {
            return Err(AppError::new(
                2,
                format!("Drop threshold must be within [0, 1], got {}.", self.drop_threshold),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(AppError::new(2, "HTTP timeout must be > 0."));
        }
        Ok(())
    }

    pub fn remote_url(&self, kind: DatasetKind) -> Option<&str> {
        match kind {
            DatasetKind::GreenBonds => self.green_bonds_url.as_deref(),
            DatasetKind::SocialBonds => self.social_bonds_url.as_deref(),
            DatasetKind::ImpactMetrics => self.impact_metrics_url.as_deref(),
        }
    }

    pub fn cache_path(&self, kind: DatasetKind) -> PathBuf {
        self.cache_dir.join(format!("{}.csv", kind.name()))
    }
}

/// `ESG_<DATASET>_SELECTOR`, e.g. `ESG_GREEN_BONDS_SELECTOR`.
pub fn selector_var(kind: DatasetKind) -> String {
    format!("ESG_{}_SELECTOR", kind.name().to_ascii_uppercase())
}

/// Non-negative hours as a `Duration`; out-of-range values are config errors.
pub fn hours(name: &str, h: f64) -> Result<Duration, AppError> {
    seconds(name, check_non_negative(name, h)? * 3600.0)
}

pub fn seconds(name: &str, secs: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(check_non_negative(name, secs)?)
        .map_err(|e| AppError::new(2, format!("`{name}` is out of range ({secs}): {e}")))
}

pub fn parse_non_negative(name: &str, raw: &str) -> Result<f64, AppError> {
    let v = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::new(2, format!("Invalid `{name}` value '{raw}': {e}")))?;
    check_non_negative(name, v)
}

pub fn check_non_negative(name: &str, v: f64) -> Result<f64, AppError> {
    if !(v.is_finite() && v >= 0.0) {
        return Err(AppError::new(2, format!("`{name}` must be finite and >= 0, got {v}.")));
    }
    Ok(v)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" | "" => Ok(false),
        other => Err(AppError::new(2, format!("Invalid `{name}` value '{other}'."))),
    }
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim();
    if v.is_empty() { None } else { Some(v.to_string()) }
}
