#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collection run result types.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tw_parking_source_models::SourceReport;

/// What happened to one configured source during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    /// The source is configured with `enabled = false`.
    Disabled,
    /// The handler ran to completion.
    Succeeded(SourceReport),
    /// Handler construction or processing failed.
    Failed {
        /// Rendered error.
        error: String,
    },
}

/// Outcome for one source, in config order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    /// Source identifier.
    pub source_id: String,
    /// What happened.
    #[serde(flatten)]
    pub status: SourceStatus,
}

impl SourceOutcome {
    /// Records produced by the source, zero unless it succeeded.
    #[must_use]
    pub fn records(&self) -> u64 {
        match &self.status {
            SourceStatus::Succeeded(report) => report.transform.records_out,
            SourceStatus::Disabled | SourceStatus::Failed { .. } => 0,
        }
    }
}

/// Result of a completed collection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeReport {
    /// Per-source outcomes in config order.
    pub sources: Vec<SourceOutcome>,
    /// Records concatenated before deduplication.
    pub records_collected: u64,
    /// Records dropped as duplicates.
    pub duplicates_removed: u64,
    /// Records in the merged table.
    pub records_merged: u64,
    /// How long the run took.
    pub duration: Duration,
}

impl MergeReport {
    /// Number of sources that ran successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, SourceStatus::Succeeded(_)))
    }

    /// Number of sources that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SourceStatus::Failed { .. }))
    }

    /// Number of disabled sources.
    #[must_use]
    pub fn disabled(&self) -> usize {
        self.count(|s| matches!(s, SourceStatus::Disabled))
    }

    fn count(&self, predicate: impl Fn(&SourceStatus) -> bool) -> usize {
        self.sources.iter().filter(|o| predicate(&o.status)).count()
    }
}
