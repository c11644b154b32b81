#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standard parking record schema and data source configuration types.
//!
//! Every municipal data source is mapped into [`StandardRecord`] rows. The
//! configuration types ([`MergeConfig`], [`SourceConfig`],
//! [`HandlerConfig`]) mirror the JSON config file that declares which
//! sources to collect and how to map their fields.

pub mod report;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tw_parking_geography::{CoordinateSystem, decimal_to_dms};

pub use report::{FetchReport, SourceReport, TransformReport};

/// Raw text values that mean "no value" in upstream exports and are
/// collapsed to an empty string.
pub const PLACEHOLDER_VALUES: &[&str] = &["None", "nan", "<NA>", "NaN"];

/// Header of the output CSV, in column order.
pub const STANDARD_COLUMNS: [&str; 7] = [
    "city", "area", "road", "dd_lat", "dd_long", "dms_lat", "dms_long",
];

/// Trims `value` and collapses placeholder values to an empty string.
#[must_use]
pub fn normalize_text(value: &str) -> String {
    let trimmed = value.trim();
    if PLACEHOLDER_VALUES.contains(&trimmed) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// One handicapped parking location in the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// City name. Never empty.
    pub city: String,
    /// District. May be empty.
    pub area: String,
    /// Road or location description. May be empty.
    pub road: String,
    /// Latitude in WGS84 decimal degrees.
    pub dd_lat: f64,
    /// Longitude in WGS84 decimal degrees.
    pub dd_long: f64,
    /// Latitude as `D°MM'SS.SS"N` / `S`.
    pub dms_lat: String,
    /// Longitude as `D°MM'SS.SS"E` / `W`.
    pub dms_long: String,
}

impl StandardRecord {
    /// Builds a record from WGS84 coordinates, normalizing the text fields
    /// and deriving both DMS strings.
    #[must_use]
    pub fn new(city: &str, area: &str, road: &str, lat: f64, lon: f64) -> Self {
        Self {
            city: normalize_text(city),
            area: normalize_text(area),
            road: normalize_text(road),
            dd_lat: lat,
            dd_long: lon,
            dms_lat: decimal_to_dms(lat, true),
            dms_long: decimal_to_dms(lon, false),
        }
    }

    /// Returns the textual value of a single field, as used for
    /// deduplication keys.
    #[must_use]
    pub fn field_value(&self, field: RecordField) -> String {
        match field {
            RecordField::City => self.city.clone(),
            RecordField::Area => self.area.clone(),
            RecordField::Road => self.road.clone(),
            RecordField::DdLat => self.dd_lat.to_string(),
            RecordField::DdLong => self.dd_long.to_string(),
            RecordField::DmsLat => self.dms_lat.clone(),
            RecordField::DmsLong => self.dms_long.clone(),
        }
    }

    /// Free-text query used to look this location up on a map service:
    /// `"{road}, {area}, {city}, Taiwan"` with empty parts omitted.
    #[must_use]
    pub fn search_query(&self) -> String {
        [
            self.road.as_str(),
            self.area.as_str(),
            self.city.as_str(),
            "Taiwan",
        ]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// A column of [`StandardRecord`], as named in configs and the CSV header.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordField {
    City,
    Area,
    Road,
    DdLat,
    DdLong,
    DmsLat,
    DmsLong,
}

/// Where a standard text field takes its value from.
///
/// Decoded once from the config string: `"fixed:Taipei City"` becomes
/// [`FieldSource::Literal`], anything else names a source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldSource {
    /// A constant value applied to every row.
    Literal(String),
    /// The name of a field in the raw source row.
    Lookup(String),
}

/// Prefix marking a literal value in a field mapping.
pub const FIXED_PREFIX: &str = "fixed:";

impl From<String> for FieldSource {
    fn from(value: String) -> Self {
        match value.strip_prefix(FIXED_PREFIX) {
            Some(literal) => Self::Literal(literal.to_string()),
            None => Self::Lookup(value),
        }
    }
}

impl From<&str> for FieldSource {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FieldSource> for String {
    fn from(value: FieldSource) -> Self {
        match value {
            FieldSource::Literal(literal) => format!("{FIXED_PREFIX}{literal}"),
            FieldSource::Lookup(field) => field,
        }
    }
}

/// Maps raw source fields onto the standard schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Source of the `city` column. Handlers fall back to their own city
    /// name when unset.
    pub city: Option<FieldSource>,
    /// Source of the `area` column.
    pub area: Option<FieldSource>,
    /// Source of the `road` column.
    pub road: Option<FieldSource>,
    /// Raw field holding the x coordinate (easting or longitude).
    pub x: Option<String>,
    /// Raw field holding the y coordinate (northing or latitude).
    pub y: Option<String>,
}

/// Wire/payload format of a source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataFormat {
    /// Paginated JSON API (bare array or wrapped records).
    JsonPaginated,
    /// Paginated CSV API.
    CsvPaginated,
    /// ZIP archive containing an ESRI shapefile.
    #[serde(alias = "zip", alias = "shp")]
    Shapefile,
}

/// Lookup table translating coded district identifiers to names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AreaCodeTable {
    /// Taipei City's 12 districts.
    Taipei,
    /// New Taipei City's 29 districts.
    NewTaipei,
}

/// How a filter compares the raw field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMatch {
    /// Keep rows whose value equals this string.
    Equals(String),
    /// Keep rows whose value contains this substring.
    Contains(String),
}

/// Source-level inclusion filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    /// Raw field to test.
    pub field: String,
    /// Comparison to apply.
    pub matcher: FilterMatch,
}

impl FilterRule {
    /// Returns `true` if `value` passes the filter.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            FilterMatch::Equals(expected) => value == expected,
            FilterMatch::Contains(pattern) => value.contains(pattern.as_str()),
        }
    }
}

impl std::fmt::Display for FilterRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.matcher {
            FilterMatch::Equals(value) => write!(f, "{} == '{value}'", self.field),
            FilterMatch::Contains(pattern) => write!(f, "{} contains '{pattern}'", self.field),
        }
    }
}

/// Handler-specific configuration block of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Endpoint or download URL.
    #[serde(default)]
    pub url: String,
    /// Payload format. Handlers pick a default when unset.
    #[serde(default)]
    pub format: Option<DataFormat>,
    /// Declared coordinate system. Auto-detected when unset.
    #[serde(default)]
    pub coordinate_system: Option<CoordinateSystem>,
    /// Field mapping onto the standard schema.
    #[serde(default)]
    pub fields_mapping: FieldMapping,
    /// Field tested by the inclusion filter.
    #[serde(default)]
    pub filter_field: Option<String>,
    /// Exact value the filter field must equal.
    #[serde(default)]
    pub filter_value: Option<String>,
    /// Substring the filter field must contain.
    #[serde(default)]
    pub filter_pattern: Option<String>,
    /// Records per page for paginated APIs.
    #[serde(default)]
    pub page_size: Option<u32>,
    /// District code table applied to the `area` column.
    #[serde(default)]
    pub area_codes: Option<AreaCodeTable>,
    /// Text encoding of shapefile attributes (e.g. `"big5"`). Read from the
    /// archive's `.cpg` or the `.dbf` header when unset.
    #[serde(default)]
    pub encoding: Option<String>,
}

impl HandlerConfig {
    /// Builds the configured filter, if any.
    ///
    /// `filter_value` (exact match) wins over `filter_pattern` (substring)
    /// when both are present.
    #[must_use]
    pub fn filter_rule(&self) -> Option<FilterRule> {
        let field = self.filter_field.clone()?;
        let matcher = match (&self.filter_value, &self.filter_pattern) {
            (Some(value), _) => FilterMatch::Equals(value.clone()),
            (None, Some(pattern)) => FilterMatch::Contains(pattern.clone()),
            (None, None) => return None,
        };
        Some(FilterRule { field, matcher })
    }
}

/// One configured data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique identifier (e.g. `"taipei_city"`).
    pub id: String,
    /// Human-readable name. Defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether this source is collected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Registry tag of the handler that processes this source.
    pub handler: String,
    /// Handler configuration.
    #[serde(default)]
    pub config: HandlerConfig,
}

impl SourceConfig {
    /// Returns the display name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Where and how the merged table is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output CSV path.
    pub file: PathBuf,
    /// Ordered deduplication keys. Empty disables deduplication.
    #[serde(default)]
    pub deduplication_keys: Vec<RecordField>,
}

/// On-disk cache of downloaded payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether cached payloads are read and written.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Days after which a cached payload is re-fetched.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            expiry_days: default_expiry_days(),
        }
    }
}

/// Top-level collection config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Sources in processing order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Output settings.
    pub output: OutputConfig,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

const fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

const fn default_expiry_days() -> u64 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_placeholders() {
        assert_eq!(normalize_text("  None "), "");
        assert_eq!(normalize_text("nan"), "");
        assert_eq!(normalize_text("<NA>"), "");
        assert_eq!(normalize_text("NaN"), "");
        assert_eq!(normalize_text(" 中正區 "), "中正區");
        assert_eq!(normalize_text("Nanjing Rd"), "Nanjing Rd");
    }

    #[test]
    fn new_record_derives_dms() {
        let record = StandardRecord::new(" Taipei City ", "nan", " Xinyi Rd ", 25.0330, 121.5654);
        assert_eq!(record.city, "Taipei City");
        assert_eq!(record.area, "");
        assert_eq!(record.road, "Xinyi Rd");
        assert_eq!(record.dms_lat, "25°01'58.80\"N");
        assert!(record.dms_long.ends_with('E'));
    }

    #[test]
    fn search_query_skips_empty_parts() {
        let record = StandardRecord::new("Taipei City", "", "Xinyi Rd", 25.0, 121.5);
        assert_eq!(record.search_query(), "Xinyi Rd, Taipei City, Taiwan");

        let record = StandardRecord::new("Taipei City", "Xinyi", "Songren Rd", 25.0, 121.5);
        assert_eq!(
            record.search_query(),
            "Songren Rd, Xinyi, Taipei City, Taiwan"
        );
    }

    #[test]
    fn decodes_fixed_prefix_as_literal() {
        assert_eq!(
            FieldSource::from("fixed:Taipei City"),
            FieldSource::Literal("Taipei City".to_string())
        );
        assert_eq!(
            FieldSource::from("district"),
            FieldSource::Lookup("district".to_string())
        );
    }

    #[test]
    fn field_source_round_trips_through_config_string() {
        let mapping: FieldMapping = serde_json::from_str(
            r#"{"city": "fixed:New Taipei City", "area": "district", "x": "X", "y": "Y"}"#,
        )
        .unwrap();
        assert_eq!(
            mapping.city,
            Some(FieldSource::Literal("New Taipei City".to_string()))
        );
        assert_eq!(
            mapping.area,
            Some(FieldSource::Lookup("district".to_string()))
        );
        assert_eq!(mapping.road, None);
        assert_eq!(mapping.x.as_deref(), Some("X"));

        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["city"], "fixed:New Taipei City");
    }

    #[test]
    fn filter_value_wins_over_pattern() {
        let config = HandlerConfig {
            filter_field: Some("pktype".to_string()),
            filter_value: Some("03".to_string()),
            filter_pattern: Some("3".to_string()),
            ..HandlerConfig::default()
        };
        let rule = config.filter_rule().unwrap();
        assert_eq!(rule.matcher, FilterMatch::Equals("03".to_string()));
        assert!(rule.matches("03"));
        assert!(!rule.matches("3"));
    }

    #[test]
    fn contains_filter_matches_substring() {
        let rule = FilterRule {
            field: "charged".to_string(),
            matcher: FilterMatch::Contains("身汽".to_string()),
        };
        assert!(rule.matches("身汽(免費)"));
        assert!(!rule.matches("汽車"));
        assert_eq!(rule.to_string(), "charged contains '身汽'");
    }

    #[test]
    fn no_filter_without_field() {
        let config = HandlerConfig {
            filter_value: Some("03".to_string()),
            ..HandlerConfig::default()
        };
        assert!(config.filter_rule().is_none());
    }

    #[test]
    fn parses_merge_config() {
        let config: MergeConfig = serde_json::from_str(
            r#"{
                "sources": [
                    {
                        "id": "taipei_city",
                        "name": "Taipei City",
                        "handler": "taipei_handler",
                        "config": {
                            "url": "https://example.test/parking.zip",
                            "format": "zip",
                            "coordinate_system": "TWD97",
                            "fields_mapping": {"city": "fixed:Taipei City"},
                            "filter_field": "pktype",
                            "filter_value": "03"
                        }
                    },
                    {"id": "disabled", "enabled": false, "handler": "api_paginated"}
                ],
                "output": {
                    "file": "data/parking_locations.csv",
                    "deduplication_keys": ["city", "dd_lat", "dd_long"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 2);
        let taipei = &config.sources[0];
        assert!(taipei.enabled);
        assert_eq!(taipei.config.format, Some(DataFormat::Shapefile));
        assert_eq!(
            taipei.config.coordinate_system,
            Some(CoordinateSystem::Twd97)
        );
        assert!(!config.sources[1].enabled);
        assert_eq!(config.sources[1].display_name(), "disabled");
        assert_eq!(
            config.output.deduplication_keys,
            vec![RecordField::City, RecordField::DdLat, RecordField::DdLong]
        );
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn rejects_unknown_dedup_key() {
        let result: Result<OutputConfig, _> =
            serde_json::from_str(r#"{"file": "out.csv", "deduplication_keys": ["zip_code"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn record_field_names_match_csv_header() {
        let names: Vec<String> = [
            RecordField::City,
            RecordField::Area,
            RecordField::Road,
            RecordField::DdLat,
            RecordField::DdLong,
            RecordField::DmsLat,
            RecordField::DmsLong,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, STANDARD_COLUMNS);
    }
}
