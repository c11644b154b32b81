#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the parking data collection tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tw_parking_cli_utils::IndicatifProgress;
use tw_parking_ingest::output::{read_csv, write_csv};
use tw_parking_ingest::{DEFAULT_CONFIG_PATH, collect_and_merge, load_config};
use tw_parking_ingest_models::SourceStatus;
use tw_parking_source::HandlerContext;
use tw_parking_source::cache::PayloadCache;
use tw_parking_source::http::ReqwestClient;
use tw_parking_source::registry::HandlerRegistry;
use tw_parking_validate::{ValidationResult, validate_csv_file};

/// Validation errors logged after a collection run.
const MAX_LOGGED_ERRORS: usize = 10;

#[derive(Parser)]
#[command(
    name = "tw_parking_ingest",
    about = "Taiwan handicapped parking data collection tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect data from all configured sources, merge, and write the CSV
    Collect {
        /// Path to the sources config (JSON, or TOML by extension)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Ignore and do not write the download cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Validate an existing output CSV
    Validate {
        /// CSV file to validate (defaults to the config's output file)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Config whose output file is validated when `--file` is absent
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// List all configured data sources
    Sources {
        /// Path to the sources config
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the map search query for every row of the output CSV
    Queries {
        /// Path to the sources config
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = tw_parking_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect { config, no_cache } => {
            let config = load_config(&config)?;

            let cache = if no_cache {
                PayloadCache::disabled()
            } else {
                PayloadCache::new(&config.cache)
            };
            let context = HandlerContext {
                http: Arc::new(ReqwestClient::new()?),
                cache,
                progress: IndicatifProgress::spinner(&multi, "Fetching"),
            };
            let enabled = config.sources.iter().filter(|s| s.enabled).count();
            let progress = IndicatifProgress::steps_bar(&multi, "Sources", enabled as u64);

            let merged =
                collect_and_merge(&config, &HandlerRegistry::with_defaults(), &context, progress)
                    .await?;
            context.progress.finish("Done".to_string());

            for outcome in &merged.report.sources {
                match &outcome.status {
                    SourceStatus::Succeeded(report) => log::info!(
                        "[{}] {} rows received, {} kept, {} records, {} skipped",
                        outcome.source_id,
                        report.fetch.rows_received,
                        report.fetch.rows_kept,
                        outcome.records(),
                        report.transform.skipped()
                    ),
                    SourceStatus::Failed { error } => {
                        log::warn!("[{}] failed: {error}", outcome.source_id);
                    }
                    SourceStatus::Disabled => {}
                }
            }

            write_csv(&config.output.file, &merged.records)?;

            log::info!("Validating {}", config.output.file.display());
            let result = validate_csv_file(&config.output.file);
            log_validation(&result);
        }
        Commands::Validate { file, config } => {
            let path = match file {
                Some(path) => path,
                None => load_config(&config)?.output.file,
            };
            let result = validate_csv_file(&path);
            println!("{}", result.summary());
            for error in &result.errors {
                println!("  - {error}");
            }
            for warning in &result.warnings {
                println!("  ! {warning}");
            }
            if !result.is_valid() {
                std::process::exit(1);
            }
        }
        Commands::Sources { config } => {
            let config = load_config(&config)?;
            let registry = HandlerRegistry::with_defaults();
            println!("{:<20} {:<20} {:<8} NAME", "ID", "HANDLER", "ENABLED");
            println!("{}", "-".repeat(70));
            for source in &config.sources {
                let handler = if registry.contains(&source.handler) {
                    source.handler.clone()
                } else {
                    format!("{} (unknown)", source.handler)
                };
                println!(
                    "{:<20} {:<20} {:<8} {}",
                    source.id,
                    handler,
                    if source.enabled { "yes" } else { "no" },
                    source.display_name()
                );
            }
        }
        Commands::Queries { config } => {
            let config = load_config(&config)?;
            print_queries(&config.output.file)?;
        }
    }

    Ok(())
}

fn log_validation(result: &ValidationResult) {
    if result.is_valid() {
        log::info!("CSV validation passed");
    } else {
        log::warn!("CSV validation found issues:");
        for error in result.errors.iter().take(MAX_LOGGED_ERRORS) {
            log::warn!("  - {error}");
        }
        if result.errors.len() > MAX_LOGGED_ERRORS {
            log::warn!(
                "  ... and {} more errors",
                result.errors.len() - MAX_LOGGED_ERRORS
            );
        }
    }
    for warning in &result.warnings {
        log::warn!("  {warning}");
    }
}

fn print_queries(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        log::error!("CSV file not found: {}", path.display());
        log::error!("Run the 'collect' command first");
        return Err(format!("{} does not exist", path.display()).into());
    }
    for record in read_csv(path)? {
        println!("{}", record.search_query());
    }
    Ok(())
}
