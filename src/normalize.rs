//! Schema normalization.
//!
//! Turns an extracted [`RawTable`] into a typed [`DataSet`]:
//!
//! 1. map source headers onto the dataset's expected columns
//! 2. coerce each required/optional cell to its semantic type
//! 3. drop rows whose required cells do not coerce, and refuse the whole table
//!    when too many rows had to be dropped
//!
//! Header matching tolerates formatting noise (case, spacing, BOMs, unit
//! suffixes such as `(Cr INR)`), plus the documented aliases of each column.
//! It never guesses what an unknown column means.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    BondRecord, COL_AMOUNT, COL_CO2_SAVED, COL_COUPON, COL_ISSUER, COL_METRIC, COL_RENEWABLE_MW,
    COL_USE_CASE, COL_USE_OF_PROCEEDS, COL_YEAR, ColumnSpec, DataSet, DatasetKind, ImpactRecord,
    Provenance, Record, Schema, SemanticType,
};
use crate::error::PipelineError;
use crate::extract::RawTable;

const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Largest accepted magnitude for a decimal cell (10^18). Anything bigger is
/// treated as a malformed value so aggregations stay far from `Decimal::MAX`.
const MAX_DECIMAL_ABS: i64 = 1_000_000_000_000_000_000;

/// How many individual row failures are echoed in the drop warning.
const DROP_SAMPLES: usize = 3;

/// One row rejected during coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDrop {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub column: &'static str,
    pub value: String,
}

/// Where each schema column was found in the source headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Source header index per schema column, in schema order.
    pub indices: Vec<Option<usize>>,
    /// Required columns with no matching header.
    pub missing: Vec<String>,
    /// Non-empty source headers that matched nothing.
    pub unmapped: Vec<String>,
}

/// Normalize `table` against `kind`'s schema.
///
/// `drop_threshold` is the largest tolerated fraction of dropped rows.
pub fn normalize(
    table: &RawTable,
    kind: DatasetKind,
    provenance: Provenance,
    drop_threshold: f64,
) -> Result<DataSet, PipelineError> {
    let schema = kind.schema();
    let mapping = map_columns(&table.headers, schema);
    let total = table.rows.len();

    if !mapping.missing.is_empty() {
        return Err(PipelineError::SchemaMismatch {
            dataset: kind.name().to_string(),
            missing: mapping.missing,
            drop_rate: 0.0,
            dropped: 0,
            total,
        });
    }
    if !mapping.unmapped.is_empty() {
        info!(dataset = %kind, columns = ?mapping.unmapped, "ignoring unmapped columns");
    }

    let mut records = Vec::with_capacity(total);
    let mut drops = Vec::new();

    for (idx, row) in table.rows.iter().enumerate() {
        match coerce_row(row, schema, &mapping.indices) {
            Ok(cells) => records.push(build_record(kind, &cells)),
            Err((column, value)) => {
                debug!(dataset = %kind, row = idx + 1, column, value = %value, "dropping row");
                drops.push(RowDrop { row: idx + 1, column, value });
            }
        }
    }

    let dropped = drops.len();
    let drop_rate = if total == 0 { 0.0 } else { dropped as f64 / total as f64 };

    if dropped > 0 {
        let samples: Vec<String> = drops
            .iter()
            .take(DROP_SAMPLES)
            .map(|d| format!("row {} `{}`='{}'", d.row, d.column, d.value))
            .collect();
        warn!(
            dataset = %kind,
            dropped,
            total,
            drop_rate = format_args!("{:.1}%", drop_rate * 100.0),
            samples = %samples.join(", "),
            "rows failed type coercion"
        );
    }

    if drop_rate > drop_threshold {
        return Err(PipelineError::SchemaMismatch {
            dataset: kind.name().to_string(),
            missing: Vec::new(),
            drop_rate,
            dropped,
            total,
        });
    }

    Ok(DataSet::new(kind, records, provenance, total, mapping.unmapped))
}

/// Map source headers onto schema columns.
///
/// Exact (normalized) names and aliases win over unit-suffix-insensitive
/// matches; each source header is used at most once, first come first served.
pub fn map_columns(headers: &[String], schema: &Schema) -> ColumnMapping {
    let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
    let bases: Vec<String> = headers.iter().map(|h| base_key(h)).collect();
    let mut used = vec![false; headers.len()];
    let mut indices = vec![None; schema.columns.len()];

    // Pass 1: exact names/aliases. Pass 2: unit suffixes ignored.
    for exact in [true, false] {
        for (col_idx, col) in schema.columns.iter().enumerate() {
            if indices[col_idx].is_some() {
                continue;
            }
            let found = (0..headers.len()).find(|&i| {
                !used[i]
                    && candidates(col).any(|cand| {
                        if exact {
                            keys[i] == header_key(cand)
                        } else {
                            !bases[i].is_empty() && bases[i] == base_key(cand)
                        }
                    })
            });
            if let Some(i) = found {
                used[i] = true;
                indices[col_idx] = Some(i);
            }
        }
    }

    let missing = schema
        .columns
        .iter()
        .zip(&indices)
        .filter(|(col, idx)| col.required && idx.is_none())
        .map(|(col, _)| col.name.to_string())
        .collect();

    let unmapped = headers
        .iter()
        .zip(&used)
        .filter(|(h, used)| !**used && !h.trim().is_empty())
        .map(|(h, _)| h.trim().to_string())
        .collect();

    ColumnMapping {
        indices,
        missing,
        unmapped,
    }
}

/// Whether a source header names `column`.
///
/// Known schema columns also match through their aliases.
pub fn headers_match(header: &str, column: &str) -> bool {
    let spec = DatasetKind::ALL
        .iter()
        .flat_map(|k| k.schema().columns.iter())
        .find(|c| header_key(c.name) == header_key(column));

    let key = header_key(header);
    let base = base_key(header);
    let matches = |cand: &str| key == header_key(cand) || (!base.is_empty() && base == base_key(cand));

    match spec {
        Some(spec) => candidates(spec).any(matches),
        None => matches(column),
    }
}

fn candidates(col: &ColumnSpec) -> impl Iterator<Item = &'static str> {
    std::iter::once(col.name).chain(col.aliases.iter().copied())
}

/// Trimmed, BOM-free, lowercased, whitespace-collapsed header.
pub fn header_key(name: &str) -> String {
    let name = name.trim().trim_start_matches('\u{feff}');
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// [`header_key`] minus trailing unit suffixes (`(...)`, `[...]`) and punctuation.
pub fn base_key(name: &str) -> String {
    let mut key = header_key(name);
    loop {
        let trimmed = key.trim_end();
        let open = match trimmed.chars().last() {
            Some(')') => trimmed.rfind('('),
            Some(']') => trimmed.rfind('['),
            _ => None,
        };
        match open {
            Some(pos) if pos > 0 => key = trimmed[..pos].to_string(),
            _ => break,
        }
    }
    key.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cell {
    Text(String),
    Year(i32),
    Decimal(Decimal),
}

/// Coerce the mapped cells of one row, in schema order.
///
/// Returns the failing column and raw value when a required cell does not
/// coerce. Optional cells that fail are recorded as absent.
fn coerce_row(
    row: &[String],
    schema: &Schema,
    indices: &[Option<usize>],
) -> Result<Vec<Option<Cell>>, (&'static str, String)> {
    let mut cells = Vec::with_capacity(schema.columns.len());

    for (col, idx) in schema.columns.iter().zip(indices) {
        let raw = idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("");
        let cell = match col.ty {
            SemanticType::Text => coerce_text(raw).map(Cell::Text),
            SemanticType::Year => coerce_year(raw).map(Cell::Year),
            SemanticType::Decimal => coerce_decimal(raw).map(Cell::Decimal),
        };
        if cell.is_none() && col.required {
            return Err((col.name, raw.to_string()));
        }
        cells.push(cell);
    }
    Ok(cells)
}

fn coerce_text(raw: &str) -> Option<String> {
    let s = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() { None } else { Some(s) }
}

/// Integer year. Accepts `2021`, `FY2021`, `FY 2021-22`, `2021-2022`, `2021.0`.
pub fn coerce_year(raw: &str) -> Option<i32> {
    let mut s = raw.trim();
    if s.len() >= 2 && s.is_char_boundary(2) && s[..2].eq_ignore_ascii_case("fy") {
        s = s[2..].trim_start();
    }

    let year = if let Ok(y) = s.parse::<i32>() {
        y
    } else if let Some(whole) = s.strip_suffix(".0") {
        whole.parse::<i32>().ok()?
    } else {
        // Fiscal-year ranges: keep the first year.
        let (first, rest) = s.split_at_checked(4)?;
        let sep_ok = rest.starts_with(['-', '/', '\u{2013}']);
        let tail = rest.get(1..)?;
        if !sep_ok || tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        first.parse::<i32>().ok()?
    };

    YEAR_RANGE.contains(&year).then_some(year)
}

/// Exact decimal, with thousands separators and currency markers removed.
///
/// Values beyond ±10^18 are rejected.
pub fn coerce_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '\u{20b9}' | '$' | '%') && !c.is_whitespace())
        .collect();

    let mut s = cleaned.as_str();
    for marker in ["rs.", "rs", "inr"] {
        if s.len() >= marker.len()
            && s.is_char_boundary(marker.len())
            && s[..marker.len()].eq_ignore_ascii_case(marker)
        {
            s = &s[marker.len()..];
            break;
        }
    }
    if s.len() >= 3 && s.is_char_boundary(s.len() - 3) && s[s.len() - 3..].eq_ignore_ascii_case("inr") {
        s = &s[..s.len() - 3];
    }

    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .ok()
        .filter(|d| d.abs() <= Decimal::new(MAX_DECIMAL_ABS, 0))
}

/// Typed view over one coerced row.
struct RowCells<'a> {
    schema: &'static Schema,
    cells: &'a [Option<Cell>],
}

impl RowCells<'_> {
    fn get(&self, name: &str) -> Option<&Cell> {
        let idx = self.schema.columns.iter().position(|c| c.name == name)?;
        self.cells.get(idx)?.as_ref()
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(Cell::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn year(&self, name: &str) -> i32 {
        match self.get(name) {
            Some(Cell::Year(y)) => *y,
            _ => 0,
        }
    }

    fn decimal(&self, name: &str) -> Option<Decimal> {
        match self.get(name) {
            Some(Cell::Decimal(d)) => Some(*d),
            _ => None,
        }
    }
}

/// Assemble a record from a row whose required cells all coerced.
fn build_record(kind: DatasetKind, cells: &[Option<Cell>]) -> Record {
    let row = RowCells {
        schema: kind.schema(),
        cells,
    };
    match kind {
        DatasetKind::GreenBonds | DatasetKind::SocialBonds => Record::Bond(BondRecord {
            year: row.year(COL_YEAR),
            issuer: row.text(COL_ISSUER).unwrap_or_default(),
            amount_cr: row.decimal(COL_AMOUNT).unwrap_or_default(),
            use_of_proceeds: row.text(COL_USE_OF_PROCEEDS),
            use_case: row.text(COL_USE_CASE),
            coupon_pct: row.decimal(COL_COUPON),
        }),
        DatasetKind::ImpactMetrics => Record::Impact(ImpactRecord {
            year: row.year(COL_YEAR),
            metric: row.text(COL_METRIC).unwrap_or_default(),
            co2_saved_tons: row.decimal(COL_CO2_SAVED).unwrap_or_default(),
            renewable_capacity_mw: row.decimal(COL_RENEWABLE_MW).unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn file() -> Provenance {
        Provenance::File {
            path: PathBuf::from("green_bonds.csv"),
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn valid_green_csv_keeps_every_row() {
        let t = table(
            &["Year", "Issuer", "Amount (Cr INR)", "Use of Proceeds"],
            &[
                &["2019", "IREDA", "1500", "Renewable Energy"],
                &["2020", "SBI", "5000.75", "Clean Transport"],
                &["2021", "Tata Cleantech", "1,200", "Solar"],
            ],
        );
        let ds = normalize(&t, DatasetKind::GreenBonds, file(), 0.5).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows_dropped(), 0);

        let first = ds.bonds().next().unwrap();
        assert_eq!(first.year, 2019);
        assert_eq!(first.issuer, "IREDA");
        assert_eq!(first.amount_cr, dec("1500"));
        assert_eq!(first.use_of_proceeds.as_deref(), Some("Renewable Energy"));
        assert_eq!(first.coupon_pct, None);
        assert_eq!(ds.bonds().nth(2).unwrap().amount_cr, dec("1200"));
    }

    #[test]
    fn sixty_percent_bad_amounts_exceed_threshold() {
        let t = table(
            &["Year", "Issuer", "Amount (Cr INR)", "Use of Proceeds"],
            &[
                &["2019", "A", "n/a", "Solar"],
                &["2019", "B", "TBD", "Solar"],
                &["2020", "C", "-", "Wind"],
                &["2020", "D", "100", "Wind"],
                &["2021", "E", "200", "Hydro"],
            ],
        );
        let err = normalize(&t, DatasetKind::GreenBonds, file(), 0.5).unwrap_err();
        match err {
            PipelineError::SchemaMismatch { missing, drop_rate, dropped, total, .. } => {
                assert!(missing.is_empty());
                assert_eq!((dropped, total), (3, 5));
                assert!((drop_rate - 0.6).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn drops_below_threshold_are_counted() {
        let t = table(
            &["Year", "Issuer", "Amount (Cr INR)"],
            &[&["2019", "A", "10"], &["20xx", "B", "20"], &["2021", "", "30"], &["2022", "D", "40"]],
        );
        let ds = normalize(&t, DatasetKind::GreenBonds, file(), 0.5).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows_read(), 4);
        assert_eq!(ds.rows_dropped(), 2);
        let issuers: Vec<_> = ds.bonds().map(|b| b.issuer.as_str()).collect();
        assert_eq!(issuers, vec!["A", "D"], "original order is preserved");
    }

    #[test]
    fn missing_required_columns_are_listed() {
        let t = table(&["Issuer", "Use Case"], &[&["NABARD", "Housing"]]);
        let err = normalize(&t, DatasetKind::SocialBonds, file(), 0.5).unwrap_err();
        match err {
            PipelineError::SchemaMismatch { missing, drop_rate, .. } => {
                assert_eq!(missing, vec!["Year".to_string(), "Amount (Cr INR)".to_string()]);
                assert_eq!(drop_rate, 0.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn spreadsheet_variant_maps_through_aliases_and_units() {
        let t = table(
            &["  year ", "Issuer Name", "Amount Raised (In Rs. Crs)", "Coupon (%)", "ISIN"],
            &[&["FY 2022-23", "REC Ltd", "Rs. 4,000", "7.25%", "INE020B08DK4"]],
        );
        let ds = normalize(&t, DatasetKind::GreenBonds, file(), 0.5).unwrap();
        let b = ds.bonds().next().unwrap();
        assert_eq!(b.year, 2022);
        assert_eq!(b.amount_cr, dec("4000"));
        assert_eq!(b.coupon_pct, Some(dec("7.25")));
        assert_eq!(ds.unmapped_columns(), &["ISIN".to_string()]);
    }

    #[test]
    fn optional_cells_that_fail_become_absent() {
        let t = table(
            &["Year", "Issuer", "Amount (Cr INR)", "Coupon (%)"],
            &[&["2021", "PFC", "500", "floating"]],
        );
        let ds = normalize(&t, DatasetKind::GreenBonds, file(), 0.0).unwrap();
        assert_eq!(ds.bonds().next().unwrap().coupon_pct, None);
    }

    #[test]
    fn impact_metrics_normalize_to_impact_records() {
        let t = table(
            &["Year", "Metric", "CO2 Saved (tons)", "Renewable Capacity (MW)"],
            &[&["2021", "Solar", "12,500", "300.5"]],
        );
        let ds = normalize(&t, DatasetKind::ImpactMetrics, file(), 0.5).unwrap();
        let rec = ds.impacts().next().unwrap();
        assert_eq!(rec.co2_saved_tons, dec("12500"));
        assert_eq!(rec.renewable_capacity_mw, dec("300.5"));
        assert_eq!(ds.bonds().count(), 0);
    }

    #[test]
    fn exact_match_beats_unit_suffix_match() {
        let headers: Vec<String> = ["Amount (USD)", "Amount (Cr INR)", "Year", "Issuer"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = map_columns(&headers, DatasetKind::GreenBonds.schema());
        assert_eq!(mapping.indices[2], Some(1));
        assert_eq!(mapping.unmapped, vec!["Amount (USD)".to_string()]);
    }

    #[test]
    fn header_keys() {
        assert_eq!(header_key("\u{feff}  Use   of Proceeds "), "use of proceeds");
        assert_eq!(base_key("Amount Raised (In Rs. Crs)"), "amount raised");
        assert_eq!(base_key("CO2 Saved [tons]"), "co2 saved");
        assert_eq!(base_key("Use-of-Proceeds"), "use of proceeds");
        assert!(headers_match("Issuer Name", "Issuer"));
        assert!(!headers_match("Issuer", "Metric"));
    }

    #[test]
    fn year_coercion() {
        assert_eq!(coerce_year("2021"), Some(2021));
        assert_eq!(coerce_year(" FY2019 "), Some(2019));
        assert_eq!(coerce_year("2019-20"), Some(2019));
        assert_eq!(coerce_year("2019/2020"), Some(2019));
        assert_eq!(coerce_year("2020.0"), Some(2020));
        assert_eq!(coerce_year("21"), None);
        assert_eq!(coerce_year("2019-"), None);
        assert_eq!(coerce_year("1850"), None);
        assert_eq!(coerce_year(""), None);
    }

    #[test]
    fn decimal_coercion() {
        assert_eq!(coerce_decimal("1,500.50"), Some(dec("1500.50")));
        assert_eq!(coerce_decimal("\u{20b9} 2,000"), Some(dec("2000")));
        assert_eq!(coerce_decimal("Rs. 750"), Some(dec("750")));
        assert_eq!(coerce_decimal("300 INR"), Some(dec("300")));
        assert_eq!(coerce_decimal("8.5%"), Some(dec("8.5")));
        assert_eq!(coerce_decimal("n/a"), None);
        assert_eq!(coerce_decimal(""), None);
        assert_eq!(coerce_decimal("1500.50").unwrap().to_string(), "1500.50");
        assert_eq!(coerce_decimal("1,000,000,000,000,000,000"), Some(dec("1000000000000000000")));
        assert_eq!(coerce_decimal("1000000000000000001"), None);
        assert_eq!(coerce_decimal("-50000000000000000000000000000"), None);
    }

    #[test]
    fn oversized_amounts_count_as_dropped_rows() {
        let t = table(
            &["Year", "Issuer", "Amount (Cr INR)"],
            &[
                &["2020", "A", "50000000000000000000000000000"],
                &["2020", "B", "50000000000000000000000000000"],
                &["2021", "C", "100"],
                &["2021", "D", "200"],
            ],
        );
        let ds = normalize(&t, DatasetKind::GreenBonds, file(), 0.5).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows_dropped(), 2);

        let all_huge = table(
            &["Year", "Issuer", "Amount (Cr INR)"],
            &[
                &["2020", "A", "50000000000000000000000000000"],
                &["2020", "B", "50000000000000000000000000000"],
            ],
        );
        let err = normalize(&all_huge, DatasetKind::GreenBonds, file(), 0.5).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { dropped: 2, total: 2, .. }));
    }
}
