//! Command-line parsing for the `esg` pipeline binary.
//!
//! Argument parsing and command dispatch stay separate from the pipeline code;
//! everything here is plain clap structs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::DatasetKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "esg", version, about = "ESG bond data ingestion pipeline")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand. Unset flags fall back to `ESG_*` env vars.
#[derive(Debug, Args, Clone, Default)]
pub struct GlobalArgs {
    /// Directory holding the per-dataset cache files.
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache validity window in hours; a younger cache skips the network.
    #[arg(long, global = true, value_name = "HOURS")]
    pub ttl_hours: Option<f64>,

    /// Largest tolerated fraction of dropped rows (0..=1).
    #[arg(long, global = true, value_name = "FRACTION")]
    pub drop_threshold: Option<f64>,

    /// HTTP timeout in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Never touch the network; serve from cache only.
    #[arg(long, global = true)]
    pub offline: bool,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve datasets (remote, then cache) and print a summary of each.
    Load(LoadArgs),
    /// Same as `load`, but always attempt the remote source first.
    Refresh(RefreshArgs),
    /// Extract and normalize one local HTML/CSV/TSV file.
    Normalize(NormalizeArgs),
    /// Top green-bond issuers and the use-of-proceeds breakdown.
    Issuers(IssuersArgs),
}

#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    /// Dataset to load; repeatable. Defaults to all three.
    #[arg(long = "dataset", short = 'd', value_enum)]
    pub datasets: Vec<DatasetKind>,

    /// Restrict totals to these years; repeatable.
    #[arg(long = "year", short = 'y')]
    pub years: Vec<i32>,

    /// Print the datasets as JSON instead of a text summary.
    #[arg(long)]
    pub json: bool,

    /// Also list the records, newest year first.
    #[arg(long, conflicts_with = "json")]
    pub rows: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RefreshArgs {
    /// Dataset to refresh; repeatable. Defaults to all three.
    #[arg(long = "dataset", short = 'd', value_enum)]
    pub datasets: Vec<DatasetKind>,
}

#[derive(Debug, Args, Clone)]
pub struct NormalizeArgs {
    /// Logical dataset the file holds.
    #[arg(long, value_enum)]
    pub kind: DatasetKind,

    /// Input file; `.html`/`.htm` is parsed as HTML, `.tsv` as TSV, anything else as CSV.
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Write the normalized rows here in cache format.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Pick the N-th table of an HTML document (0-based).
    #[arg(long, value_name = "N", conflicts_with = "headers")]
    pub table: Option<usize>,

    /// Pick the first table whose headers include all of these.
    #[arg(long, value_name = "A,B,...", value_delimiter = ',')]
    pub headers: Option<Vec<String>>,
}

#[derive(Debug, Args, Clone)]
pub struct IssuersArgs {
    /// Number of issuers to list.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Restrict to these years; repeatable.
    #[arg(long = "year", short = 'y')]
    pub years: Vec<i32>,
}
