//! Flat CSV cache files, one per logical dataset.
//!
//! The cache format is the normalized schema itself: canonical headers, one
//! line per record, empty cells for absent optional values. Decimals keep
//! their original scale so a write/read cycle reproduces the same values.
//!
//! Files are replaced whole: the new content goes to a temp file in the same
//! directory which is then renamed over the old one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::domain::{
    COL_AMOUNT, COL_CO2_SAVED, COL_COUPON, COL_ISSUER, COL_METRIC, COL_RENEWABLE_MW, COL_USE_CASE,
    COL_USE_OF_PROCEEDS, COL_YEAR, DataSet, Record,
};
use crate::error::CacheError;

/// Raw content of a cache file plus its modification time.
#[derive(Debug, Clone)]
pub struct CachedContent {
    pub path: PathBuf,
    pub content: String,
    pub modified: Option<DateTime<Utc>>,
}

/// Read a cache file. `Ok(None)` when it does not exist.
pub fn read_cache(path: &Path) -> Result<Option<CachedContent>, CacheError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(CachedContent {
        path: path.to_path_buf(),
        content,
        modified: modified_at(path).map(DateTime::<Utc>::from),
    }))
}

/// Whether `path` exists and was written less than `ttl` before `now`.
pub fn is_fresh(path: &Path, ttl: Duration, now: SystemTime) -> bool {
    match modified_at(path) {
        // A modification time in the future counts as fresh.
        Some(modified) => now.duration_since(modified).map(|age| age < ttl).unwrap_or(true),
        None => false,
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Write `dataset` to `path` in cache format, atomically replacing any existing file.
pub fn write_dataset_csv(path: &Path, dataset: &DataSet) -> Result<(), CacheError> {
    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source: csv::Error| CacheError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        let schema = dataset.kind().schema();
        writer.write_record(schema.headers()).map_err(csv_err)?;
        for record in dataset.records() {
            let fields: Vec<String> = schema.headers().map(|col| field(record, col)).collect();
            writer.write_record(&fields).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file_mut().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Render one record field under its canonical column header.
fn field(record: &Record, column: &str) -> String {
    fn opt<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    match record {
        Record::Bond(b) => match column {
            COL_YEAR => b.year.to_string(),
            COL_ISSUER => b.issuer.clone(),
            COL_AMOUNT => b.amount_cr.to_string(),
            COL_USE_OF_PROCEEDS => opt(&b.use_of_proceeds),
            COL_USE_CASE => opt(&b.use_case),
            COL_COUPON => opt(&b.coupon_pct),
            _ => String::new(),
        },
        Record::Impact(i) => match column {
            COL_YEAR => i.year.to_string(),
            COL_METRIC => i.metric.clone(),
            COL_CO2_SAVED => i.co2_saved_tons.to_string(),
            COL_RENEWABLE_MW => i.renewable_capacity_mw.to_string(),
            _ => String::new(),
        },
    }
}

/// Render `dataset` in cache format to any writer (used for stdout output).
pub fn write_dataset_to<W: Write>(out: W, dataset: &DataSet) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    let schema = dataset.kind().schema();
    writer.write_record(schema.headers())?;
    for record in dataset.records() {
        let fields: Vec<String> = schema.headers().map(|col| field(record, col)).collect();
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}
