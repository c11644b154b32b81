//! Raw row to [`StandardRecord`] mapping shared by every handler.
//!
//! Row-level problems never fail the transform: each skipped row is tallied
//! in the [`TransformReport`] under the reason it was dropped.

use geo::Centroid;
use tw_parking_geography::{
    CoordinateSystem, detect_coordinate_system, is_twd97_range, twd97_to_wgs84,
    validate_coordinates,
};
use tw_parking_source_models::{
    AreaCodeTable, FieldSource, SourceConfig, StandardRecord, TransformReport, normalize_text,
};

use crate::districts::{self, DistrictLookup};
use crate::{RawRow, RawTable, RowLocation, SourceError, config_error, value_to_string};

/// Default x field for sources whose coordinates live in attributes.
pub const DEFAULT_X_FIELD: &str = "X";

/// Default y field for sources whose coordinates live in attributes.
pub const DEFAULT_Y_FIELD: &str = "Y";

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq)]
enum Skip {
    MissingCoordinates,
    InvalidCoordinates,
    OutOfRange(CoordinateSystem, f64, f64),
    EmptyGeometry,
    UnsupportedGeometry(String),
    EmptyCity,
    Error(String),
}

impl Skip {
    fn tally(&self, report: &mut TransformReport) {
        match self {
            Self::MissingCoordinates => report.missing_coordinates += 1,
            Self::InvalidCoordinates => report.invalid_coordinates += 1,
            Self::OutOfRange(..) => report.out_of_range += 1,
            Self::EmptyGeometry => report.empty_geometry += 1,
            Self::UnsupportedGeometry(_) => report.unsupported_geometry += 1,
            Self::EmptyCity => report.empty_city += 1,
            Self::Error(_) => report.errors += 1,
        }
    }
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCoordinates => f.write_str("missing coordinates"),
            Self::InvalidCoordinates => f.write_str("non-numeric coordinates"),
            Self::OutOfRange(system, x, y) => {
                write!(f, "coordinates out of {system} range X={x}, Y={y}")
            }
            Self::EmptyGeometry => f.write_str("empty geometry"),
            Self::UnsupportedGeometry(kind) => write!(f, "unsupported geometry type {kind}"),
            Self::EmptyCity => f.write_str("empty city"),
            Self::Error(message) => f.write_str(message),
        }
    }
}

/// Field mapping and coordinate settings resolved from a [`SourceConfig`].
#[derive(Debug, Clone)]
pub struct RowTransformer {
    label: String,
    city: FieldSource,
    area: Option<FieldSource>,
    road: Option<FieldSource>,
    x_field: String,
    y_field: String,
    declared: Option<CoordinateSystem>,
    districts: Option<AreaCodeTable>,
}

impl RowTransformer {
    /// Resolves the mapping of `source`, using `default_city` when the
    /// mapping has no `city` entry.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if neither the mapping nor the
    /// handler provides a city.
    pub fn new(source: &SourceConfig, default_city: Option<&str>) -> Result<Self, SourceError> {
        let mapping = &source.config.fields_mapping;
        let city = mapping
            .city
            .clone()
            .or_else(|| default_city.map(|city| FieldSource::Literal(city.to_string())))
            .ok_or_else(|| config_error(source, "fields_mapping.city is required"))?;

        Ok(Self {
            label: source.id.clone(),
            city,
            area: mapping.area.clone(),
            road: mapping.road.clone(),
            x_field: mapping.x.clone().unwrap_or_else(|| DEFAULT_X_FIELD.to_string()),
            y_field: mapping.y.clone().unwrap_or_else(|| DEFAULT_Y_FIELD.to_string()),
            declared: source.config.coordinate_system,
            districts: source.config.area_codes,
        })
    }

    /// Transforms every row of `table`, skipping and tallying bad rows.
    #[must_use]
    pub fn apply(&self, table: &RawTable) -> (Vec<StandardRecord>, TransformReport) {
        let label = &self.label;
        log::info!("[{label}] Starting transformation for {} rows", table.rows.len());

        let system = self.declared.or(table.embedded_system);
        let mut report = TransformReport {
            rows_in: table.rows.len() as u64,
            ..TransformReport::default()
        };
        let mut assumed_twd97 = 0_u64;
        let mut records = Vec::with_capacity(table.rows.len());

        for (idx, row) in table.rows.iter().enumerate() {
            match self.transform_row(row, system, &mut assumed_twd97, &mut report) {
                Ok(record) => records.push(record),
                Err(skip) => {
                    match &skip {
                        Skip::Error(_) => log::error!("[{label}] Row {idx}: {skip}"),
                        Skip::OutOfRange(..) | Skip::UnsupportedGeometry(_) => {
                            log::warn!("[{label}] Row {idx}: {skip}, skipping");
                        }
                        _ => log::debug!("[{label}] Row {idx}: {skip}, skipping"),
                    }
                    skip.tally(&mut report);
                }
            }
        }

        if assumed_twd97 > 0 {
            log::warn!(
                "[{label}] {assumed_twd97} rows had coordinates matching no known system; assumed TWD97"
            );
        }

        report.records_out = records.len() as u64;
        log::info!(
            "[{label}] Transformation complete: {} valid records, {} skipped, {} errors",
            report.records_out,
            report.skipped() - report.errors,
            report.errors
        );
        if records.is_empty() {
            log::warn!("[{label}] No valid records after transformation");
        }

        (records, report)
    }

    fn transform_row(
        &self,
        row: &RawRow,
        system: Option<CoordinateSystem>,
        assumed_twd97: &mut u64,
        report: &mut TransformReport,
    ) -> Result<StandardRecord, Skip> {
        let (x, y) = self.raw_xy(row)?;

        let system = system
            .or_else(|| detect_coordinate_system(x, y))
            .unwrap_or_else(|| {
                *assumed_twd97 += 1;
                CoordinateSystem::Twd97
            });

        let (lat, lon) = match system {
            CoordinateSystem::Twd97 => {
                if !is_twd97_range(x, y) {
                    return Err(Skip::OutOfRange(system, x, y));
                }
                twd97_to_wgs84(x, y)
            }
            CoordinateSystem::Wgs84 => {
                if !validate_coordinates(y, x) {
                    return Err(Skip::OutOfRange(system, x, y));
                }
                (y, x)
            }
        };

        if !(lat.is_finite() && lon.is_finite()) {
            return Err(Skip::Error(format!(
                "conversion of X={x}, Y={y} produced a non-finite position"
            )));
        }

        let city = normalize_text(&resolve(&self.city, row));
        if city.is_empty() {
            return Err(Skip::EmptyCity);
        }

        let area = self
            .area
            .as_ref()
            .map(|source| normalize_text(&resolve(source, row)))
            .unwrap_or_default();
        let area = self.translate_area(area, report);

        let road = self
            .road
            .as_ref()
            .map(|source| resolve(source, row))
            .unwrap_or_default();

        Ok(StandardRecord::new(&city, &area, &road, lat, lon))
    }

    fn raw_xy(&self, row: &RawRow) -> Result<(f64, f64), Skip> {
        match &row.location {
            RowLocation::Fields => Ok((
                number_field(row, &self.x_field)?,
                number_field(row, &self.y_field)?,
            )),
            RowLocation::Geometry(None) => Err(Skip::EmptyGeometry),
            RowLocation::Geometry(Some(geometry)) => {
                let point = match geometry {
                    geo::Geometry::Point(point) => Some(*point),
                    other => other.centroid(),
                };
                point.map(|p| p.x_y()).ok_or(Skip::EmptyGeometry)
            }
            RowLocation::Unsupported(kind) => Err(Skip::UnsupportedGeometry(kind.clone())),
        }
    }

    fn translate_area(&self, area: String, report: &mut TransformReport) -> String {
        let Some(table) = self.districts else {
            return area;
        };

        match districts::lookup(table, &area) {
            DistrictLookup::Name(name) => name.to_string(),
            DistrictLookup::NotACode(_) => area,
            DistrictLookup::Unknown(code) => {
                log::warn!("[{}] Unknown area code '{code}' for table {table}", self.label);
                report.unknown_area_codes += 1;
                area
            }
        }
    }
}

/// Value of a mapped text field for `row`.
fn resolve(source: &FieldSource, row: &RawRow) -> String {
    match source {
        FieldSource::Literal(value) => value.clone(),
        FieldSource::Lookup(field) => row
            .fields
            .get(field)
            .map(value_to_string)
            .unwrap_or_default(),
    }
}

/// Reads a numeric coordinate from an attribute field.
fn number_field(row: &RawRow, field: &str) -> Result<f64, Skip> {
    let value = match row.fields.get(field) {
        None | Some(serde_json::Value::Null) => return Err(Skip::MissingCoordinates),
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or(Skip::InvalidCoordinates)?,
        Some(serde_json::Value::String(s)) => {
            let text = normalize_text(s);
            if text.is_empty() {
                return Err(Skip::MissingCoordinates);
            }
            text.parse::<f64>().map_err(|_| Skip::InvalidCoordinates)?
        }
        Some(_) => return Err(Skip::InvalidCoordinates),
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(Skip::InvalidCoordinates)
    }
}
