#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parking data source handlers.
//!
//! Each municipal data source is processed by a [`SourceHandler`], built
//! from its [`SourceConfig`] through the [`registry::HandlerRegistry`].
//! Handlers fetch raw rows (a paginated API or a zipped shapefile), apply
//! the source's inclusion filter, and transform the surviving rows into
//! [`StandardRecord`]s.

pub mod api_paginated;
pub mod cache;
pub mod districts;
pub mod filter;
pub mod http;
pub mod progress;
pub mod registry;
pub mod shapefile_zip;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tw_parking_geography::CoordinateSystem;
use tw_parking_source_models::{
    FetchReport, SourceConfig, SourceReport, StandardRecord, TransformReport,
};

use crate::cache::PayloadCache;
use crate::http::HttpClient;
use crate::progress::ProgressCallback;

/// A raw source row, keyed by the source's own field names.
pub type RawFields = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A request failed without an underlying transport error.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The downloaded archive could not be read.
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The shapefile inside the archive could not be read.
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// The archive did not contain the expected files.
    #[error("Archive error: {message}")]
    Archive {
        /// Description of what went wrong.
        message: String,
    },

    /// The response body had an unexpected shape.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },

    /// The filter field is absent from the data, even case-insensitively.
    #[error("Filter field '{field}' not found (available: {available:?})")]
    MissingFilterField {
        /// Configured filter field.
        field: String,
        /// Field names present in the data.
        available: Vec<String>,
    },

    /// Handler configuration is missing or inconsistent.
    #[error("Invalid configuration for source '{source_id}': {message}")]
    Config {
        /// Source identifier.
        source_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// No handler is registered under the requested tag.
    #[error("No handler registered for '{tag}' (available: {available})")]
    UnknownHandler {
        /// Requested tag.
        tag: String,
        /// Registered tags, comma separated.
        available: String,
    },
}

/// Where a raw row's coordinates come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RowLocation {
    /// The mapped x/y fields of the row.
    Fields,
    /// A decoded geometry. `None` for null shapes.
    Geometry(Option<geo::Geometry<f64>>),
    /// A geometry type that cannot be reduced to a point.
    Unsupported(String),
}

/// One raw row as returned by a handler's fetch step.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Attribute fields.
    pub fields: RawFields,
    /// Coordinate source.
    pub location: RowLocation,
}

impl RawRow {
    /// Creates a row whose coordinates live in its attribute fields.
    #[must_use]
    pub const fn from_fields(fields: RawFields) -> Self {
        Self {
            fields,
            location: RowLocation::Fields,
        }
    }
}

/// Filtered rows returned by a handler's fetch step.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Rows that passed the inclusion filter.
    pub rows: Vec<RawRow>,
    /// Coordinate system declared by the payload itself (e.g. a `.prj`).
    pub embedded_system: Option<CoordinateSystem>,
    /// Fetch counters.
    pub report: FetchReport,
}

/// Records and report produced by [`SourceHandler::process`].
#[derive(Debug, Clone)]
pub struct SourceOutput {
    /// Standard records in source order.
    pub records: Vec<StandardRecord>,
    /// Combined fetch and transform counters.
    pub report: SourceReport,
}

/// Shared services handed to every handler.
#[derive(Clone)]
pub struct HandlerContext {
    /// HTTP client used for all requests.
    pub http: Arc<dyn HttpClient>,
    /// On-disk payload cache.
    pub cache: PayloadCache,
    /// Progress reporting for long-running fetches.
    pub progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Trait that all parking data sources implement.
///
/// A handler knows how to fetch its raw rows (already filtered) and how to
/// turn them into [`StandardRecord`]s. [`process`](Self::process) chains
/// the two.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Returns the identifier of the configured source.
    fn id(&self) -> &str;

    /// Retrieves raw rows from the source and applies the inclusion filter.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the first unit of work fails or the
    /// payload is structurally unreadable.
    async fn fetch_data(&self) -> Result<RawTable, SourceError>;

    /// Maps raw rows into standard records. Row-level problems are
    /// skipped and tallied in the returned report.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] only for structural problems.
    fn transform_data(
        &self,
        table: RawTable,
    ) -> Result<(Vec<StandardRecord>, TransformReport), SourceError>;

    /// Fetches and transforms in one step.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if either step fails.
    async fn process(&self) -> Result<SourceOutput, SourceError> {
        let table = self.fetch_data().await?;
        let fetch = table.report.clone();
        let (records, transform) = self.transform_data(table)?;

        Ok(SourceOutput {
            records,
            report: SourceReport {
                source_id: self.id().to_string(),
                fetch,
                transform,
            },
        })
    }
}

/// Returns a configuration error for `config`.
pub(crate) fn config_error(config: &SourceConfig, message: impl Into<String>) -> SourceError {
    SourceError::Config {
        source_id: config.id.clone(),
        message: message.into(),
    }
}

/// Renders a raw JSON value as text the way it appears in the source.
///
/// Strings are returned as-is, `null` becomes empty, and anything else uses
/// its JSON rendering.
#[must_use]
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
