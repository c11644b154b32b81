#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for collecting handicapped parking locations from municipal
//! open data sources into one deduplicated CSV.

pub mod output;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tw_parking_ingest_models::{MergeReport, SourceOutcome, SourceStatus};
use tw_parking_source::progress::ProgressCallback;
use tw_parking_source::registry::HandlerRegistry;
use tw_parking_source::{HandlerContext, SourceError, SourceOutput};
use tw_parking_source_models::{MergeConfig, RecordField, SourceConfig, StandardRecord};

/// Config file read when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "data/data_sources.json";

/// Errors that abort a whole collection run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not a valid config.
    #[error("Invalid config {path}: {message}")]
    ConfigParse {
        /// Config path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The config declares no sources.
    #[error("No sources configured")]
    NoSources,

    /// Every configured source is disabled.
    #[error("All {0} configured sources are disabled")]
    NoEnabledSources(usize),

    /// No source produced any records.
    #[error("No data collected from any source")]
    NoData,

    /// Output file I/O failed.
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output CSV could not be written or read.
    #[error("Output CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Deduplicated, sorted records of one run.
#[derive(Debug, Clone)]
pub struct MergedTable {
    /// Records in output order.
    pub records: Vec<StandardRecord>,
    /// What happened along the way.
    pub report: MergeReport,
}

/// Loads a [`MergeConfig`] from JSON, or TOML when the path ends in
/// `.toml`.
///
/// # Errors
///
/// Returns [`IngestError::ConfigRead`] if the file cannot be read and
/// [`IngestError::ConfigParse`] if it does not describe a valid config.
pub fn load_config(path: &Path) -> Result<MergeConfig, IngestError> {
    log::info!("Loading configuration from: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str::<MergeConfig>(&text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<MergeConfig>(&text).map_err(|e| e.to_string())
    };
    let config = parsed.map_err(|message| IngestError::ConfigParse {
        path: path.to_path_buf(),
        message,
    })?;

    log::info!("Found {} data sources", config.sources.len());
    Ok(config)
}

/// Runs every enabled source in config order, then concatenates,
/// deduplicates and sorts the results.
///
/// A failing source is logged and recorded in the report; the run
/// continues with the next one. `progress` advances once per enabled
/// source.
///
/// # Errors
///
/// Returns [`IngestError::NoSources`] or [`IngestError::NoEnabledSources`]
/// if there is nothing to run, and [`IngestError::NoData`] if every source
/// came back empty or failed.
pub async fn collect_and_merge(
    config: &MergeConfig,
    registry: &HandlerRegistry,
    context: &HandlerContext,
    progress: Arc<dyn ProgressCallback>,
) -> Result<MergedTable, IngestError> {
    let start = Instant::now();

    if config.sources.is_empty() {
        return Err(IngestError::NoSources);
    }
    let enabled = config.sources.iter().filter(|s| s.enabled).count();
    if enabled == 0 {
        return Err(IngestError::NoEnabledSources(config.sources.len()));
    }

    log::info!(
        "Starting data collection from {} sources ({enabled} enabled)",
        config.sources.len()
    );
    progress.set_total(enabled as u64);

    let mut report = MergeReport::default();
    let mut records = Vec::new();

    for source in &config.sources {
        let id = &source.id;
        if !source.enabled {
            log::info!("[{id}] Source '{}' is disabled, skipping", source.display_name());
            report.sources.push(SourceOutcome {
                source_id: id.clone(),
                status: SourceStatus::Disabled,
            });
            continue;
        }

        progress.set_message(format!("Processing {}", source.display_name()));
        let status = match process_source(source, registry, context).await {
            Ok(output) => {
                if output.records.is_empty() {
                    log::warn!("[{id}] No data collected from {}", source.display_name());
                } else {
                    log::info!(
                        "[{id}] Collected {} records from {}",
                        output.records.len(),
                        source.display_name()
                    );
                }
                records.extend(output.records);
                SourceStatus::Succeeded(output.report)
            }
            Err(e) => {
                log::error!("[{id}] Failed to process source '{}': {e}", source.display_name());
                SourceStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        report.sources.push(SourceOutcome {
            source_id: id.clone(),
            status,
        });
        progress.inc(1);
    }

    log::info!(
        "Collection complete: {} successful, {} failed",
        report.succeeded(),
        report.failed()
    );

    if records.is_empty() {
        progress.finish("No data collected".to_string());
        return Err(IngestError::NoData);
    }

    report.records_collected = records.len() as u64;
    log::info!("Total records before deduplication: {}", records.len());

    let mut records = deduplicate(records, &config.output.deduplication_keys);
    report.duplicates_removed = report.records_collected - records.len() as u64;

    sort_records(&mut records);
    report.records_merged = records.len() as u64;
    report.duration = start.elapsed();

    log::info!(
        "Merged {} records ({} duplicates removed) in {:.1}s",
        report.records_merged,
        report.duplicates_removed,
        report.duration.as_secs_f64()
    );
    progress.finish(format!("{} records merged", report.records_merged));

    Ok(MergedTable { records, report })
}

async fn process_source(
    source: &SourceConfig,
    registry: &HandlerRegistry,
    context: &HandlerContext,
) -> Result<SourceOutput, SourceError> {
    let handler = registry.build(source, context)?;
    handler.process().await
}

/// Drops every record whose `keys` values repeat those of an earlier
/// record. An empty key list disables deduplication.
#[must_use]
pub fn deduplicate(records: Vec<StandardRecord>, keys: &[RecordField]) -> Vec<StandardRecord> {
    if keys.is_empty() {
        log::warn!("No deduplication keys specified, skipping deduplication");
        return records;
    }

    log::info!(
        "Deduplicating using keys: {}",
        keys.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let initial = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<StandardRecord> = records
        .into_iter()
        .filter(|record| {
            let key: Vec<String> = keys.iter().map(|k| record.field_value(*k)).collect();
            seen.insert(key)
        })
        .collect();

    log::info!("Removed {} duplicate records", initial - kept.len());
    kept
}

/// Stable sort by (city, area, road).
pub fn sort_records(records: &mut [StandardRecord]) {
    records.sort_by(|a, b| (&a.city, &a.area, &a.road).cmp(&(&b.city, &b.area, &b.road)));
}
