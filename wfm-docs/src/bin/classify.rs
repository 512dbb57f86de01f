//! wfm-classify - Offline filename classification
//!
//! Classifies file names against a JSON employee roster and prints one
//! classification per file as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wfm_common::api::Employee;
use wfm_common::config::TomlConfig;
use wfm_docs::classify::classify_with_year;

#[derive(Parser, Debug)]
#[command(name = "wfm-classify")]
#[command(about = "Classify uploaded file names against the employee roster")]
#[command(version)]
struct Args {
    /// JSON file with the employee roster (array of employees)
    #[arg(short, long)]
    roster: PathBuf,

    /// Year assumed when a file name carries none
    #[arg(short, long)]
    year: Option<i32>,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,

    /// Exit with status 2 when any file needs manual review
    #[arg(long)]
    strict: bool,

    /// Bootstrap TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File names to classify
    #[arg(required = true)]
    files: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref());

    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    info!(
        "Starting WFM classifier (wfm-classify) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Err(e) = &config {
        warn!("Using default configuration: {}", e);
    }

    let text = std::fs::read_to_string(&args.roster)
        .with_context(|| format!("Failed to read roster {}", args.roster.display()))?;
    let roster: Vec<Employee> =
        serde_json::from_str(&text).context("Roster must be a JSON array of employees")?;
    info!("Loaded roster with {} employees", roster.len());

    let year = args.year.unwrap_or_else(wfm_common::time::current_year);
    let results: Vec<_> = args
        .files
        .iter()
        .map(|file| classify_with_year(file, &roster, year))
        .collect();

    let output = if args.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{}", output);

    let pending = results.iter().filter(|r| r.needs_review()).count();
    if pending > 0 {
        warn!("{} of {} files need manual review", pending, results.len());
        if args.strict {
            std::process::exit(2);
        }
    }
    Ok(())
}
