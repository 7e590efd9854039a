//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use satflow::BoundingBox;
use satflow::provider::parse_date;

/// Discover and download satellite imagery from EarthExplorer and Copernicus.
///
/// Credentials are read from LANDSATXPLORE_USERNAME / LANDSATXPLORE_PASSWORD
/// and DHUS_USER / DHUS_PASSWORD (a .env file in the working directory is
/// loaded first when present).
#[derive(Parser, Debug)]
#[command(name = "satflow")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/satflow/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query every product type, then download all matches
    Run(RunArgs),
    /// Query one product type and print the records as JSON lines
    Query(QueryArgs),
    /// Download records from a file produced by `query` (JSON lines) or a JSON array
    Download(DownloadArgs),
}

/// Area and time window of a search.
#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Bounding box as MINLON,MINLAT,MAXLON,MAXLAT
    #[arg(long, value_name = "MINLON,MINLAT,MAXLON,MAXLAT", allow_hyphen_values = true)]
    pub bbox: BoundingBox,

    /// First acquisition date (YYYYMMDD or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Last acquisition date (YYYYMMDD or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub end_date: NaiveDate,
}

/// Download tuning shared by `run` and `download`.
#[derive(clap::Args, Debug, Default)]
pub struct DownloadOptions {
    /// Base directory for downloads (default: satdata)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-64, default: 8)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: Option<u16>,

    /// Attempts per download, 1 disables retry (1-10, default: 1)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub download_attempts: Option<u32>,
}

/// Arguments of `satflow run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Product type to query; repeatable (default: S2MSI1C and landsat_8_c1)
    #[arg(short = 't', long = "product-type", value_name = "TYPE")]
    pub product_types: Vec<String>,

    /// Attempts per product-type query (1-10, default: 3)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub query_attempts: Option<u32>,

    #[command(flatten)]
    pub download: DownloadOptions,
}

/// Arguments of `satflow query`.
#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Product type to query
    #[arg(short = 't', long = "product-type", value_name = "TYPE")]
    pub product_type: String,

    /// Attempts for the query (1-10, default: 3)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub query_attempts: Option<u32>,
}

/// Arguments of `satflow download`.
#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Records file: JSON lines as printed by `query`, or a JSON array
    #[arg(long, value_name = "FILE")]
    pub records: PathBuf,

    #[command(flatten)]
    pub download: DownloadOptions,
}
