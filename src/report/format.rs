//! Formatted terminal output.
//!
//! All text rendering lives here so the pipeline and aggregation code stay
//! free of presentation concerns.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::data::{Resolution, SourceWarning};
use crate::domain::{DataSet, DatasetKind, Record};
use crate::error::PipelineError;

use super::{
    CategoryTotal, IssuerTotal, amount_by_use_case, available_years, bonds_in_years, filter_years,
    impact_totals, impacts_in_years, sorted_by_year_desc, total_amount, unique_issuers,
};

/// Summary block for one resolved dataset, totals restricted to `years`.
pub fn format_resolution(res: &Resolution, years: &[i32]) -> String {
    let mut out = format_dataset_summary(&res.dataset, years);
    if res.is_stale_fallback() {
        out.push_str("  note: remote source unavailable, showing cached data\n");
    }
    out.push_str(&format_warnings(&res.warnings));
    out
}

/// Header, provenance, row accounting and the headline totals for a dataset.
pub fn format_dataset_summary(ds: &DataSet, years: &[i32]) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} ===\n", ds.kind().display_name()));
    out.push_str(&format!("Source: {}\n", ds.provenance()));
    out.push_str(&format!(
        "Rows: kept={} read={} dropped={} ({:.1}%)\n",
        ds.len(),
        ds.rows_read(),
        ds.rows_dropped(),
        ds.drop_rate() * 100.0
    ));
    if !ds.unmapped_columns().is_empty() {
        out.push_str(&format!("Ignored columns: {}\n", ds.unmapped_columns().join(", ")));
    }

    let all_years = available_years(ds);
    if let (Some(first), Some(last)) = (all_years.first(), all_years.last()) {
        out.push_str(&format!("Years: {first}-{last}\n"));
    }
    if !years.is_empty() {
        let shown: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        out.push_str(&format!("Filter: {}\n", shown.join(", ")));
    }

    match ds.kind() {
        DatasetKind::GreenBonds => {
            let bonds = bonds_in_years(ds, years);
            out.push_str(&format!("Total issued: {}\n", fmt_crore(total_amount(&bonds))));
            out.push_str(&format!("Unique issuers: {}\n", unique_issuers(&bonds)));
            out.push_str(&format!("Bonds: {}\n", bonds.len()));
        }
        DatasetKind::SocialBonds => {
            let bonds = bonds_in_years(ds, years);
            out.push_str(&format!("Total issued: {}\n", fmt_crore(total_amount(&bonds))));
            out.push_str(&format!("Unique issuers: {}\n", unique_issuers(&bonds)));
            let by_case = amount_by_use_case(&bonds);
            if !by_case.is_empty() {
                out.push_str("By use case:\n");
                out.push_str(&format_categories(&by_case));
            }
        }
        DatasetKind::ImpactMetrics => {
            let totals = impact_totals(&impacts_in_years(ds, years));
            out.push_str(&format!(
                "CO2 saved: {} tons\n",
                fmt_grouped(totals.co2_saved_tons)
            ));
            out.push_str(&format!(
                "Renewable capacity added: {} MW\n",
                fmt_grouped(totals.renewable_capacity_mw)
            ));
        }
    }

    out
}

/// Line shown in place of a dataset that could not be resolved.
pub fn format_unavailable(kind: DatasetKind, err: &PipelineError) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} ===\n", kind.display_name()));
    let hint = match err {
        PipelineError::DataUnavailable { .. } => "no data available",
        PipelineError::ExtractionFailed { .. } => "data could not be read",
        PipelineError::SchemaMismatch { .. } => "data did not match the expected layout",
    };
    out.push_str(&format!("(empty) {hint}: {err}\n"));
    out
}

pub fn format_warnings(warnings: &[SourceWarning]) -> String {
    let mut out = String::new();
    for w in warnings {
        out.push_str(&format!("  warning: {w}\n"));
    }
    out
}

/// Top-issuer table followed by the proceeds breakdown.
pub fn format_issuers(top: &[IssuerTotal], distribution: &[CategoryTotal]) -> String {
    let mut out = String::new();

    out.push_str("Top issuers:\n");
    if top.is_empty() {
        out.push_str("  (none)\n");
    } else {
        out.push_str(format!("{:<4} {:<32} {:>16}", "#", "issuer", "amount").trim_end());
        out.push('\n');
        out.push_str(format!("{:-<4} {:-<32} {:-<16}", "", "", "").trim_end());
        out.push('\n');
        for (i, t) in top.iter().enumerate() {
            out.push_str(&format!(
                "{:<4} {:<32} {:>16}\n",
                i + 1,
                truncate(&t.issuer, 32),
                fmt_crore(t.amount_cr)
            ));
        }
    }

    out.push_str("\nUse of proceeds:\n");
    if distribution.is_empty() {
        out.push_str("  (none)\n");
    } else {
        out.push_str(&format_categories(distribution));
    }

    out
}

fn format_categories(rows: &[CategoryTotal]) -> String {
    let total = rows
        .iter()
        .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.amount_cr));
    let mut out = String::new();
    for c in rows {
        // Divide first: `amount * 100` can overflow near `Decimal::MAX`.
        let share = c
            .amount_cr
            .checked_div(total)
            .and_then(|f| f.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO);
        let share = format!("{:.1}%", share.round_dp(1));
        out.push_str(&format!(
            "  {:<32} {:>16} {:>7}\n",
            truncate(&c.category, 32),
            fmt_crore(c.amount_cr),
            share
        ));
    }
    out
}

/// Record table, newest year first, restricted to `years`.
pub fn format_rows(ds: &DataSet, years: &[i32]) -> String {
    let rows = sorted_by_year_desc(&filter_years(ds, years));
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("  (no rows)\n");
        return out;
    }

    match ds.kind() {
        DatasetKind::GreenBonds => {
            push_header(&mut out, &["year", "issuer", "amount", "use of proceeds", "coupon"]);
        }
        DatasetKind::SocialBonds => {
            push_header(&mut out, &["year", "issuer", "amount", "use case", ""]);
        }
        DatasetKind::ImpactMetrics => {
            push_header(&mut out, &["year", "metric", "co2 tons", "mw", ""]);
        }
    }

    for r in rows {
        let line = match r {
            Record::Bond(b) => format!(
                "{:<6} {:<28} {:>16} {:<24} {:>8}",
                b.year,
                truncate(&b.issuer, 28),
                fmt_crore(b.amount_cr),
                truncate(
                    b.use_of_proceeds.as_deref().or(b.use_case.as_deref()).unwrap_or(""),
                    24
                ),
                b.coupon_pct.map(|c| format!("{c}%")).unwrap_or_default(),
            ),
            Record::Impact(i) => format!(
                "{:<6} {:<28} {:>16} {:<24}",
                i.year,
                truncate(&i.metric, 28),
                fmt_grouped(i.co2_saved_tons),
                fmt_grouped(i.renewable_capacity_mw),
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn push_header(out: &mut String, cols: &[&str; 5]) {
    out.push_str(
        format!(
            "{:<6} {:<28} {:>16} {:<24} {:>8}",
            cols[0], cols[1], cols[2], cols[3], cols[4]
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<6} {:-<28} {:-<16} {:-<24}", "", "", "", "").trim_end());
    out.push('\n');
}

/// Rupee amount in crore, whole units with thousands separators.
pub fn fmt_crore(v: Decimal) -> String {
    format!("₹{} Cr", fmt_grouped(v))
}

/// Rounded to whole units, comma-grouped by thousands.
pub fn fmt_grouped(v: Decimal) -> String {
    let rounded = v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
