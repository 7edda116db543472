//! Shared domain types.
//!
//! These types are kept serializable so a presentation layer can consume a
//! resolved [`DataSet`] directly (JSON) without going through the CSV cache.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::Serialize;

/// The three logical datasets tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[value(name = "green_bonds", alias = "green")]
    GreenBonds,
    #[value(name = "social_bonds", alias = "social")]
    SocialBonds,
    #[value(name = "impact_metrics", alias = "impact")]
    ImpactMetrics,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::GreenBonds,
        DatasetKind::SocialBonds,
        DatasetKind::ImpactMetrics,
    ];

    /// Logical dataset name; also the cache file stem.
    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::GreenBonds => "green_bonds",
            DatasetKind::SocialBonds => "social_bonds",
            DatasetKind::ImpactMetrics => "impact_metrics",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DatasetKind::GreenBonds => "Green Bonds",
            DatasetKind::SocialBonds => "Social & Sustainability-linked Bonds",
            DatasetKind::ImpactMetrics => "Impact Metrics",
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            DatasetKind::GreenBonds => &GREEN_BONDS_SCHEMA,
            DatasetKind::SocialBonds => &SOCIAL_BONDS_SCHEMA,
            DatasetKind::ImpactMetrics => &IMPACT_METRICS_SCHEMA,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic type a column is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Text,
    Year,
    Decimal,
}

/// One expected column of a dataset schema.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Canonical header, as written to the cache file.
    pub name: &'static str,
    /// Other header spellings seen in the wild, compared after normalization.
    pub aliases: &'static [&'static str],
    pub ty: SemanticType,
    pub required: bool,
}

/// Ordered column contract for one logical dataset.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub columns: &'static [ColumnSpec],
}

impl Schema {
    pub fn headers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn required(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }
}

pub const COL_YEAR: &str = "Year";
pub const COL_ISSUER: &str = "Issuer";
pub const COL_AMOUNT: &str = "Amount (Cr INR)";
pub const COL_USE_OF_PROCEEDS: &str = "Use of Proceeds";
pub const COL_COUPON: &str = "Coupon (%)";
pub const COL_USE_CASE: &str = "Use Case";
pub const COL_METRIC: &str = "Metric";
pub const COL_CO2_SAVED: &str = "CO2 Saved (tons)";
pub const COL_RENEWABLE_MW: &str = "Renewable Capacity (MW)";

const YEAR: ColumnSpec = ColumnSpec {
    name: COL_YEAR,
    aliases: &["financial year", "fy"],
    ty: SemanticType::Year,
    required: true,
};

const ISSUER: ColumnSpec = ColumnSpec {
    name: COL_ISSUER,
    aliases: &["issuer name", "name of the issuer", "company"],
    ty: SemanticType::Text,
    required: true,
};

// The spreadsheet variant publishes "Amount Raised (In Rs. Crs)".
const AMOUNT: ColumnSpec = ColumnSpec {
    name: COL_AMOUNT,
    aliases: &["amount raised", "issue size", "amount issued"],
    ty: SemanticType::Decimal,
    required: true,
};

pub static GREEN_BONDS_SCHEMA: Schema = Schema {
    columns: &[
        YEAR,
        ISSUER,
        AMOUNT,
        ColumnSpec {
            name: COL_USE_OF_PROCEEDS,
            aliases: &["sector", "category", "proceeds"],
            ty: SemanticType::Text,
            required: false,
        },
        ColumnSpec {
            name: COL_COUPON,
            aliases: &["coupon rate"],
            ty: SemanticType::Decimal,
            required: false,
        },
    ],
};

pub static SOCIAL_BONDS_SCHEMA: Schema = Schema {
    columns: &[
        YEAR,
        ISSUER,
        ColumnSpec {
            name: COL_USE_CASE,
            aliases: &[],
            ty: SemanticType::Text,
            required: false,
        },
        AMOUNT,
    ],
};

pub static IMPACT_METRICS_SCHEMA: Schema = Schema {
    columns: &[
        ColumnSpec {
            name: COL_YEAR,
            aliases: &[],
            ty: SemanticType::Year,
            required: true,
        },
        ColumnSpec {
            name: COL_METRIC,
            aliases: &[],
            ty: SemanticType::Text,
            required: true,
        },
        ColumnSpec {
            name: COL_CO2_SAVED,
            aliases: &["co2 avoided"],
            ty: SemanticType::Decimal,
            required: true,
        },
        ColumnSpec {
            name: COL_RENEWABLE_MW,
            aliases: &["renewable energy added"],
            ty: SemanticType::Decimal,
            required: true,
        },
    ],
};

/// One issuance row (green or social bonds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondRecord {
    pub year: i32,
    pub issuer: String,
    /// Amount raised, crore INR.
    pub amount_cr: Decimal,
    pub use_of_proceeds: Option<String>,
    pub use_case: Option<String>,
    pub coupon_pct: Option<Decimal>,
}

/// One impact-metrics row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactRecord {
    pub year: i32,
    pub metric: String,
    pub co2_saved_tons: Decimal,
    pub renewable_capacity_mw: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Bond(BondRecord),
    Impact(ImpactRecord),
}

impl Record {
    pub fn year(&self) -> i32 {
        match self {
            Record::Bond(b) => b.year,
            Record::Impact(i) => i.year,
        }
    }
}

/// Where raw content came from. Diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Remote {
        url: String,
        retrieved_at: DateTime<Utc>,
    },
    Local {
        path: PathBuf,
    },
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Remote { url, retrieved_at } => {
                write!(f, "{url} (retrieved {})", retrieved_at.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            SourceDescriptor::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Provenance note attached to a returned [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Fetched live during this resolution.
    Remote { url: String, fetched_at: DateTime<Utc> },
    /// Read from the dataset's cache file.
    Cache {
        path: PathBuf,
        modified: Option<DateTime<Utc>>,
    },
    /// Read from an arbitrary local file (`esg normalize`).
    File { path: PathBuf },
}

impl Provenance {
    pub fn is_cached(&self) -> bool {
        matches!(self, Provenance::Cache { .. })
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Remote { url, fetched_at } => {
                write!(f, "fetched from {url} at {}", fetched_at.format("%Y-%m-%d %H:%M UTC"))
            }
            Provenance::Cache { path, modified: Some(m) } => {
                write!(f, "cached ({}, {})", path.display(), m.format("%Y-%m-%d %H:%M UTC"))
            }
            Provenance::Cache { path, modified: None } => write!(f, "cached ({})", path.display()),
            Provenance::File { path } => write!(f, "local file {}", path.display()),
        }
    }
}

/// Validated, ordered records of one logical dataset.
///
/// Built fresh on every load and never mutated afterwards; fields are only
/// reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSet {
    kind: DatasetKind,
    records: Vec<Record>,
    provenance: Provenance,
    rows_read: usize,
    rows_dropped: usize,
    unmapped_columns: Vec<String>,
}

impl DataSet {
    pub(crate) fn new(
        kind: DatasetKind,
        records: Vec<Record>,
        provenance: Provenance,
        rows_read: usize,
        unmapped_columns: Vec<String>,
    ) -> Self {
        let rows_dropped = rows_read.saturating_sub(records.len());
        Self {
            kind,
            records,
            provenance,
            rows_read,
            rows_dropped,
            unmapped_columns,
        }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn rows_dropped(&self) -> usize {
        self.rows_dropped
    }

    /// Fraction of source rows discarded during coercion.
    pub fn drop_rate(&self) -> f64 {
        if self.rows_read == 0 {
            0.0
        } else {
            self.rows_dropped as f64 / self.rows_read as f64
        }
    }

    /// Source headers that did not map to any schema column.
    pub fn unmapped_columns(&self) -> &[String] {
        &self.unmapped_columns
    }

    pub fn bonds(&self) -> impl Iterator<Item = &BondRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Bond(b) => Some(b),
            Record::Impact(_) => None,
        })
    }

    pub fn impacts(&self) -> impl Iterator<Item = &ImpactRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Impact(i) => Some(i),
            Record::Bond(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_value_names_match_cache_stems() {
        for kind in DatasetKind::ALL {
            assert_eq!(DatasetKind::from_str(kind.name(), false), Ok(kind));
        }
        assert_eq!(DatasetKind::from_str("green", false), Ok(DatasetKind::GreenBonds));
        assert!(DatasetKind::from_str("unknown", false).is_err());
    }

    #[test]
    fn schemas_match_documented_headers() {
        let green: Vec<_> = DatasetKind::GreenBonds.schema().headers().collect();
        assert_eq!(&green[..4], &["Year", "Issuer", "Amount (Cr INR)", "Use of Proceeds"]);

        let social: Vec<_> = DatasetKind::SocialBonds.schema().headers().collect();
        assert_eq!(social, vec!["Year", "Issuer", "Use Case", "Amount (Cr INR)"]);

        let impact: Vec<_> = DatasetKind::ImpactMetrics.schema().headers().collect();
        assert_eq!(
            impact,
            vec!["Year", "Metric", "CO2 Saved (tons)", "Renewable Capacity (MW)"]
        );
    }

    #[test]
    fn drop_rate_counts_missing_records() {
        let ds = DataSet::new(
            DatasetKind::ImpactMetrics,
            Vec::new(),
            Provenance::File {
                path: PathBuf::from("x.csv"),
            },
            4,
            Vec::new(),
        );
        assert_eq!(ds.rows_dropped(), 4);
        assert!((ds.drop_rate() - 1.0).abs() < 1e-12);
    }
}
