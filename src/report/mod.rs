//! Aggregations feeding the dashboard's charts and metrics.
//!
//! Everything here is a pure function over already-validated records, so the
//! presentation layer never has to re-check types. Sums saturate at
//! `Decimal::MAX` instead of panicking; the normalizer already rejects cells
//! big enough to get there.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{BondRecord, DataSet, ImpactRecord, Record};

pub mod format;

pub use format::*;

/// Label used when a record has no category.
pub const UNSPECIFIED: &str = "Unspecified";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerTotal {
    pub issuer: String,
    pub amount_cr: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount_cr: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImpactTotals {
    pub co2_saved_tons: Decimal,
    pub renewable_capacity_mw: Decimal,
}

/// Distinct years present in the dataset, ascending.
pub fn available_years(dataset: &DataSet) -> Vec<i32> {
    dataset
        .records()
        .iter()
        .map(|r| r.year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Records whose year is in `years`. An empty selection keeps everything.
pub fn filter_years<'a>(dataset: &'a DataSet, years: &[i32]) -> Vec<&'a Record> {
    dataset
        .records()
        .iter()
        .filter(|r| years.is_empty() || years.contains(&r.year()))
        .collect()
}

/// Bond records whose year is in `years`. An empty selection keeps everything.
pub fn bonds_in_years<'a>(dataset: &'a DataSet, years: &[i32]) -> Vec<&'a BondRecord> {
    dataset
        .bonds()
        .filter(|b| years.is_empty() || years.contains(&b.year))
        .collect()
}

/// Impact records whose year is in `years`. An empty selection keeps everything.
pub fn impacts_in_years<'a>(dataset: &'a DataSet, years: &[i32]) -> Vec<&'a ImpactRecord> {
    dataset
        .impacts()
        .filter(|i| years.is_empty() || years.contains(&i.year))
        .collect()
}

pub fn total_amount(bonds: &[&BondRecord]) -> Decimal {
    bonds
        .iter()
        .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.amount_cr))
}

pub fn unique_issuers(bonds: &[&BondRecord]) -> usize {
    bonds.iter().map(|b| b.issuer.as_str()).collect::<BTreeSet<_>>().len()
}

/// Largest issuers by summed amount. Ties resolve alphabetically.
pub fn top_issuers(bonds: &[&BondRecord], n: usize) -> Vec<IssuerTotal> {
    let mut sums: HashMap<&str, Decimal> = HashMap::new();
    for b in bonds {
        let sum = sums.entry(b.issuer.as_str()).or_default();
        *sum = sum.saturating_add(b.amount_cr);
    }

    let mut totals: Vec<IssuerTotal> = sums
        .into_iter()
        .map(|(issuer, amount_cr)| IssuerTotal {
            issuer: issuer.to_string(),
            amount_cr,
        })
        .collect();
    totals.sort_by(|a, b| b.amount_cr.cmp(&a.amount_cr).then_with(|| a.issuer.cmp(&b.issuer)));
    totals.truncate(n);
    totals
}

/// Amount raised per use-of-proceeds category, sorted by category.
pub fn proceeds_distribution(bonds: &[&BondRecord]) -> Vec<CategoryTotal> {
    sum_by(bonds, |b| b.use_of_proceeds.as_deref())
}

/// Amount raised per social-bond use case, sorted by use case.
pub fn amount_by_use_case(bonds: &[&BondRecord]) -> Vec<CategoryTotal> {
    sum_by(bonds, |b| b.use_case.as_deref())
}

fn sum_by<'a>(bonds: &[&'a BondRecord], key: impl Fn(&'a BondRecord) -> Option<&'a str>) -> Vec<CategoryTotal> {
    let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();
    for b in bonds {
        let sum = sums.entry(key(b).unwrap_or(UNSPECIFIED)).or_default();
        *sum = sum.saturating_add(b.amount_cr);
    }
    sums.into_iter()
        .map(|(category, amount_cr)| CategoryTotal {
            category: category.to_string(),
            amount_cr,
        })
        .collect()
}

pub fn impact_totals(impacts: &[&ImpactRecord]) -> ImpactTotals {
    impacts.iter().fold(ImpactTotals::default(), |acc, i| ImpactTotals {
        co2_saved_tons: acc.co2_saved_tons.saturating_add(i.co2_saved_tons),
        renewable_capacity_mw: acc.renewable_capacity_mw.saturating_add(i.renewable_capacity_mw),
    })
}

/// Newest first; rows within one year keep their original order.
pub fn sorted_by_year_desc<'a>(records: &[&'a Record]) -> Vec<&'a Record> {
    let mut out = records.to_vec();
    out.sort_by_key(|r| std::cmp::Reverse(r.year()));
    out
}
