//! Per-stage counters returned alongside records.

use serde::{Deserialize, Serialize};

/// Outcome of a handler's fetch step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Pages (or archives) successfully retrieved.
    pub pages_fetched: u32,
    /// Raw rows received before filtering.
    pub rows_received: u64,
    /// Rows kept by the inclusion filter.
    pub rows_kept: u64,
    /// Whether the payload came from the on-disk cache.
    pub from_cache: bool,
    /// Set when pagination stopped on an error after at least one page.
    pub truncated_by: Option<String>,
    /// Whether pagination stopped at the safety cap.
    pub hit_page_cap: bool,
    /// Attribute values with bytes invalid in the resolved text encoding.
    pub text_decode_errors: u64,
}

impl FetchReport {
    /// Rows dropped by the inclusion filter.
    #[must_use]
    pub const fn rows_filtered_out(&self) -> u64 {
        self.rows_received.saturating_sub(self.rows_kept)
    }
}

/// Row-level tallies from a handler's transform step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    /// Raw rows handed to the transform.
    pub rows_in: u64,
    /// Standard records produced.
    pub records_out: u64,
    /// Rows without one or both coordinates.
    pub missing_coordinates: u64,
    /// Rows whose coordinates were not numeric.
    pub invalid_coordinates: u64,
    /// Rows whose coordinates fell outside the resolved system's range.
    pub out_of_range: u64,
    /// Rows with a null or empty geometry.
    pub empty_geometry: u64,
    /// Rows with a geometry type that cannot be reduced to a point.
    pub unsupported_geometry: u64,
    /// Rows whose resolved city was empty.
    pub empty_city: u64,
    /// Rows that failed conversion for any other reason.
    pub errors: u64,
    /// Area values not found in the configured district table.
    pub unknown_area_codes: u64,
}

impl TransformReport {
    /// Total rows skipped for any reason.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.missing_coordinates
            + self.invalid_coordinates
            + self.out_of_range
            + self.empty_geometry
            + self.unsupported_geometry
            + self.empty_city
            + self.errors
    }
}

/// Combined report of one handler's `process()` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source identifier.
    pub source_id: String,
    /// Fetch counters.
    pub fetch: FetchReport,
    /// Transform counters.
    pub transform: TransformReport,
}
