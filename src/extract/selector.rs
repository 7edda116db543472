//! Table selection strategies.
//!
//! Picking "the first table on the page" breaks as soon as the upstream page
//! gains a table above the one we want. `ByHeaderSignature` is the sturdier
//! alternative; both plug into the same extraction path.

use std::fmt;

use crate::domain::DatasetKind;
use crate::normalize::headers_match;

use super::RawTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelector {
    /// Zero-based position in document order.
    ByPosition(usize),
    /// First table whose headers contain every listed column.
    ByHeaderSignature(Vec<String>),
}

impl Default for TableSelector {
    fn default() -> Self {
        TableSelector::ByPosition(0)
    }
}

impl TableSelector {
    /// Signature made of a dataset's required columns.
    pub fn signature_for(kind: DatasetKind) -> Self {
        TableSelector::ByHeaderSignature(
            kind.schema().required().map(|c| c.name.to_string()).collect(),
        )
    }

    /// Parse a selector setting for `kind`.
    ///
    /// Accepted forms: `first` (or empty), a 0-based index `N`, `headers`
    /// (the dataset's required columns), `headers:A,B,...`.
    pub fn parse(raw: &str, kind: DatasetKind) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("first") {
            return Ok(TableSelector::default());
        }
        if raw.eq_ignore_ascii_case("headers") {
            return Ok(TableSelector::signature_for(kind));
        }
        let listed = raw
            .split_once(':')
            .filter(|(head, _)| head.trim().eq_ignore_ascii_case("headers"));
        if let Some((_, list)) = listed {
            let columns: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if columns.is_empty() {
                return Err(format!("selector '{raw}' lists no headers"));
            }
            return Ok(TableSelector::ByHeaderSignature(columns));
        }
        raw.parse::<usize>()
            .map(TableSelector::ByPosition)
            .map_err(|_| format!("unknown table selector '{raw}' (expected first, N, headers or headers:A,B)"))
    }

    /// Pick a table. Ties always resolve to the earliest table in document order.
    pub fn select<'a>(&self, tables: &'a [RawTable]) -> Option<&'a RawTable> {
        match self {
            TableSelector::ByPosition(idx) => tables.get(*idx),
            TableSelector::ByHeaderSignature(columns) => tables.iter().find(|t| {
                columns
                    .iter()
                    .all(|col| t.headers.iter().any(|h| headers_match(h, col)))
            }),
        }
    }
}

impl fmt::Display for TableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSelector::ByPosition(0) => write!(f, "first table"),
            TableSelector::ByPosition(idx) => write!(f, "table #{}", idx + 1),
            TableSelector::ByHeaderSignature(cols) => {
                write!(f, "table with headers [{}]", cols.join(", "))
            }
        }
    }
}
