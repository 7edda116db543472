//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main: it parses the CLI,
//! layers the configuration, runs the pipeline and prints results.

use std::io::{self, Write};
use std::path::Path;

use clap::Parser;
use serde::Serialize;

use crate::cli::{Cli, Command, GlobalArgs, IssuersArgs, LoadArgs, NormalizeArgs};
use crate::config::{PipelineConfig, hours, seconds};
use crate::domain::{DatasetKind, Provenance, Record};
use crate::error::AppError;
use crate::extract::TableSelector;

pub mod pipeline;

/// Entry point for the `esg` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::logging::init(cli.global.verbose);

    let mut config = PipelineConfig::from_env()?;
    apply_global_args(&mut config, &cli.global)?;

    match cli.command {
        Command::Load(args) => handle_load(&config, &args),
        Command::Refresh(args) => {
            config.force_refresh = true;
            handle_load(
                &config,
                &LoadArgs {
                    datasets: args.datasets,
                    years: Vec::new(),
                    json: false,
                    rows: false,
                },
            )
        }
        Command::Normalize(args) => handle_normalize(&config, &args),
        Command::Issuers(args) => handle_issuers(&config, &args),
    }
}

/// Overlay CLI flags on an env-derived config and re-validate.
pub fn apply_global_args(config: &mut PipelineConfig, args: &GlobalArgs) -> Result<(), AppError> {
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(h) = args.ttl_hours {
        config.cache_ttl = hours("--ttl-hours", h)?;
    }
    if let Some(t) = args.drop_threshold {
        config.drop_threshold = t;
    }
    if let Some(secs) = args.timeout {
        config.http_timeout = seconds("--timeout", secs)?;
    }
    if args.offline {
        config.offline = true;
    }
    config.validate()
}

fn requested(kinds: &[DatasetKind]) -> Vec<DatasetKind> {
    if kinds.is_empty() {
        DatasetKind::ALL.to_vec()
    } else {
        let mut out = Vec::with_capacity(kinds.len());
        for k in kinds {
            if !out.contains(k) {
                out.push(*k);
            }
        }
        out
    }
}

fn handle_load(config: &PipelineConfig, args: &LoadArgs) -> Result<(), AppError> {
    let kinds = requested(&args.datasets);
    let years = args.years.as_slice();
    let output = pipeline::load_datasets(config, &kinds)?;

    if args.json {
        let entries: Vec<JsonEntry<'_>> = output
            .results
            .iter()
            .map(|(kind, res)| match res {
                Ok(r) => JsonEntry::Loaded {
                    dataset: *kind,
                    provenance: r.dataset.provenance(),
                    rows_read: r.dataset.rows_read(),
                    rows_dropped: r.dataset.rows_dropped(),
                    warnings: r.warnings.iter().map(ToString::to_string).collect(),
                    records: crate::report::sorted_by_year_desc(&crate::report::filter_years(
                        &r.dataset, years,
                    )),
                },
                Err(e) => JsonEntry::Unavailable {
                    dataset: *kind,
                    error: e.to_string(),
                },
            })
            .collect();
        let text = serde_json::to_string_pretty(&entries)
            .map_err(|e| AppError::new(4, format!("Failed to serialize output: {e}")))?;
        println!("{text}");
    } else {
        for (kind, res) in &output.results {
            match res {
                Ok(r) => {
                    println!("{}", crate::report::format_resolution(r, years));
                    if args.rows {
                        println!("{}", crate::report::format_rows(&r.dataset, years));
                    }
                }
                Err(e) => println!("{}", crate::report::format_unavailable(*kind, e)),
            }
        }
    }

    if output.resolved_count() == 0 {
        return Err(AppError::new(4, "No dataset could be loaded."));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum JsonEntry<'a> {
    Loaded {
        dataset: DatasetKind,
        provenance: &'a Provenance,
        rows_read: usize,
        rows_dropped: usize,
        warnings: Vec<String>,
        records: Vec<&'a Record>,
    },
    Unavailable {
        dataset: DatasetKind,
        error: String,
    },
}

/// Table selector from `--table` / `--headers`; the first table otherwise.
pub fn selector_from_args(args: &NormalizeArgs) -> TableSelector {
    match (args.table, &args.headers) {
        (Some(n), _) => TableSelector::ByPosition(n),
        (None, Some(headers)) if !headers.is_empty() => TableSelector::ByHeaderSignature(headers.clone()),
        _ => TableSelector::default(),
    }
}

fn handle_normalize(config: &PipelineConfig, args: &NormalizeArgs) -> Result<(), AppError> {
    let selector = selector_from_args(args);
    let dataset = pipeline::normalize_file(&args.input, args.kind, &selector, config.drop_threshold)?;
    let summary = crate::report::format_dataset_summary(&dataset, &[]);

    match args.output.as_deref() {
        // `-` streams the normalized CSV to stdout; the summary moves to stderr.
        Some(p) if p == Path::new("-") => {
            eprintln!("{summary}");
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            crate::io::write_dataset_to(&mut lock, &dataset)
                .map_err(|e| AppError::new(4, format!("Failed to write CSV to stdout: {e}")))?;
            lock.flush()
                .map_err(|e| AppError::new(4, format!("Failed to flush stdout: {e}")))?;
        }
        Some(p) => {
            crate::io::write_dataset_csv(p, &dataset)?;
            println!("{summary}");
            println!("Wrote {} rows to {}", dataset.len(), p.display());
        }
        None => println!("{summary}"),
    }
    Ok(())
}

fn handle_issuers(config: &PipelineConfig, args: &IssuersArgs) -> Result<(), AppError> {
    let output = pipeline::load_datasets(config, &[DatasetKind::GreenBonds])?;
    let Some(result) = output.get(DatasetKind::GreenBonds) else {
        return Err(AppError::new(4, "Green bond dataset was not resolved."));
    };
    let resolution = result.as_ref().map_err(|e| AppError::from(e.clone()))?;

    let bonds = crate::report::bonds_in_years(&resolution.dataset, &args.years);
    let top = crate::report::top_issuers(&bonds, args.top);
    let distribution = crate::report::proceeds_distribution(&bonds);

    print!("{}", crate::report::format_warnings(&resolution.warnings));
    println!("Source: {}", resolution.dataset.provenance());
    println!("{}", crate::report::format_issuers(&top, &distribution));
    Ok(())
}
