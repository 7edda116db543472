//! Table extraction: raw content in, untyped rows and headers out.
//!
//! - HTML documents are scanned for `<table>` elements (`html`)
//! - delimited text (CSV/TSV exports, the cache files) is read as a single sheet
//! - `selector` decides which table is "the" table
//!
//! No type coercion happens here; that is the normalizer's job.

use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::domain::SourceDescriptor;
use crate::error::PipelineError;

pub mod html;
pub mod selector;

pub use selector::TableSelector;

/// Ordered headers plus ordered rows of raw cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// How to read a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    /// Single-sheet delimited text with the given delimiter byte.
    Delimited(u8),
}

impl ContentKind {
    pub const CSV: ContentKind = ContentKind::Delimited(b',');
    pub const TSV: ContentKind = ContentKind::Delimited(b'\t');

    /// Guess from the file extension; anything unknown is treated as CSV.
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("html" | "htm") => ContentKind::Html,
            Some("tsv" | "tab") => ContentKind::TSV,
            _ => ContentKind::CSV,
        }
    }
}

/// Extract the selected table from `content`.
///
/// Fails with `ExtractionFailed` when nothing matches the selector or the
/// selected table has no header or no data rows.
pub fn extract_table(
    content: &str,
    kind: ContentKind,
    selector: &TableSelector,
    origin: &SourceDescriptor,
) -> Result<RawTable, PipelineError> {
    let fail = |reason: String| PipelineError::ExtractionFailed {
        selector: selector.to_string(),
        origin: origin.clone(),
        reason,
    };

    let tables = match kind {
        ContentKind::Html => html::tables(content),
        ContentKind::Delimited(delim) => vec![read_delimited(content, delim).map_err(fail)?],
    };
    debug!(origin = %origin, tables = tables.len(), "scanned content for tables");

    if tables.is_empty() {
        return Err(fail("no table found".to_string()));
    }
    let table = selector
        .select(&tables)
        .ok_or_else(|| fail(format!("none of {} table(s) matched", tables.len())))?;

    if table.headers.iter().all(|h| h.is_empty()) {
        return Err(fail("selected table has no header row".to_string()));
    }
    if table.rows.is_empty() {
        return Err(fail("selected table has no data rows".to_string()));
    }
    Ok(table.clone())
}

/// Read the single sheet of a delimited export verbatim.
///
/// A record the CSV reader rejects is kept as an empty row so the normalizer
/// counts it as dropped instead of it silently disappearing.
fn read_delimited(content: &str, delimiter: u8) -> Result<RawTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read header row: {e}"))?
        .iter()
        .map(clean_header)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) if is_blank(&record) => {}
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                // +2: header line plus 1-based numbering.
                debug!(line = idx + 2, error = %e, "unreadable delimited record");
                rows.push(Vec::new());
            }
        }
    }

    Ok(RawTable { headers, rows })
}

fn clean_header(name: &str) -> String {
    // Spreadsheet exports often carry a UTF-8 BOM on the first header.
    name.trim_start_matches('\u{feff}').trim().to_string()
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|c| c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn origin() -> SourceDescriptor {
        SourceDescriptor::Local {
            path: PathBuf::from("test.html"),
        }
    }

    #[test]
    fn default_rule_returns_first_table_even_if_second_is_larger() {
        let doc = "<table><tr><th>Year</th><th>Issuer</th></tr>\
                   <tr><td>2021</td><td>IREDA</td></tr></table>\
                   <table><tr><th>Year</th><th>Issuer</th></tr>\
                   <tr><td>2018</td><td>A</td></tr><tr><td>2019</td><td>B</td></tr>\
                   <tr><td>2020</td><td>C</td></tr></table>";
        let t = extract_table(doc, ContentKind::Html, &TableSelector::default(), &origin()).unwrap();
        assert_eq!(t.rows, vec![vec!["2021".to_string(), "IREDA".to_string()]]);
    }

    #[test]
    fn missing_table_reports_selector_and_source() {
        let err = extract_table("<p>maintenance</p>", ContentKind::Html, &TableSelector::default(), &origin())
            .unwrap_err();
        match err {
            PipelineError::ExtractionFailed { selector, origin, reason } => {
                assert_eq!(selector, "first table");
                assert_eq!(origin.to_string(), "test.html");
                assert_eq!(reason, "no table found");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let doc = "<table><tr><th>A</th></tr><tr><td>1</td></tr></table>";
        let err = extract_table(doc, ContentKind::Html, &TableSelector::ByPosition(3), &origin()).unwrap_err();
        assert!(err.to_string().contains("table #4"));
    }

    #[test]
    fn header_only_table_is_an_extraction_failure() {
        let err = extract_table("Year,Issuer\n", ContentKind::CSV, &TableSelector::default(), &origin())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed { .. }));
    }

    #[test]
    fn delimited_reads_sheet_verbatim() {
        let content = "\u{feff} Year ,Issuer,Amount (Cr INR)\n2021, IREDA ,\"1,500.50\"\n,,\n2022,PFC,200\n";
        let t = extract_table(content, ContentKind::CSV, &TableSelector::default(), &origin()).unwrap();
        assert_eq!(t.headers, vec!["Year", "Issuer", "Amount (Cr INR)"]);
        assert_eq!(
            t.rows,
            vec![
                vec!["2021".to_string(), "IREDA".to_string(), "1,500.50".to_string()],
                vec!["2022".to_string(), "PFC".to_string(), "200".to_string()],
            ]
        );
    }

    #[test]
    fn tsv_and_html_detected_from_extension() {
        assert_eq!(ContentKind::for_path(Path::new("a/b.TSV")), ContentKind::TSV);
        assert_eq!(ContentKind::for_path(Path::new("page.htm")), ContentKind::Html);
        assert_eq!(ContentKind::for_path(Path::new("green_bonds.csv")), ContentKind::CSV);
        assert_eq!(ContentKind::for_path(Path::new("noext")), ContentKind::CSV);
    }
}
