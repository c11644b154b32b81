#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Validation of collected parking record tables.
//!
//! [`validate`] checks a [`RecordTable`] against the record schema and
//! reports findings; it never modifies or drops rows.

pub mod table;

use std::collections::BTreeMap;
use std::path::Path;

use tw_parking_geography::{dms_to_decimal, is_in_taiwan, validate_coordinates};
use tw_parking_source_models::STANDARD_COLUMNS;

pub use table::RecordTable;

/// Columns whose cells must be present in every row. `area` and `road`
/// may legitimately be empty.
const NON_EMPTY_COLUMNS: [&str; 5] = ["city", "dd_lat", "dd_long", "dms_lat", "dms_long"];

/// Columns that identify a duplicate row.
const DUPLICATE_COLUMNS: [&str; 5] = ["city", "area", "road", "dd_lat", "dd_long"];

/// Largest accepted gap between a DMS string and its decimal column.
const DMS_TOLERANCE: f64 = 1e-3;

/// Errors reading a table for validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid CSV.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

/// Findings of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Errors in the order found.
    pub errors: Vec<String>,
    /// Warnings in the order found.
    pub warnings: Vec<String>,
    /// Rows that passed every field check.
    pub valid_rows: usize,
    /// Rows with at least one field violation.
    pub invalid_rows: usize,
}

impl ValidationResult {
    /// `true` if no errors were found. Warnings never affect validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Multi-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Validation Summary:\n  Valid rows: {}\n  Invalid rows: {}\n  Errors: {}\n  Warnings: {}",
            self.valid_rows,
            self.invalid_rows,
            self.errors.len(),
            self.warnings.len()
        )
    }

    fn error(message: String) -> Self {
        Self {
            errors: vec![message],
            ..Self::default()
        }
    }
}

/// Validates `table` against the record schema.
#[must_use]
pub fn validate(table: &RecordTable) -> ValidationResult {
    let mut result = ValidationResult::default();

    let missing: Vec<&str> = STANDARD_COLUMNS
        .iter()
        .copied()
        .filter(|c| table.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        result
            .errors
            .push(format!("Missing required columns: {}", missing.join(", ")));
        return result;
    }

    if table.is_empty() {
        result.warnings.push("Table is empty".to_string());
        return result;
    }

    let columns = Columns::resolve(table);

    for row in 0..table.len() {
        let violations = check_row(table, &columns, row);
        if violations.is_empty() {
            result.valid_rows += 1;
        } else {
            result.invalid_rows += 1;
            result
                .errors
                .push(format!("Row {row}: {}", violations.join("; ")));
        }
    }

    let duplicates = duplicate_rows(table);
    if !duplicates.is_empty() {
        result
            .warnings
            .push(format!("Found {} duplicate rows", duplicates.len()));
        result
            .warnings
            .push(format!("Duplicate row indices: {duplicates:?}"));
    }

    for column in NON_EMPTY_COLUMNS {
        let Some(index) = table.column_index(column) else {
            continue;
        };
        let count = (0..table.len())
            .filter(|&row| table.cell(row, index).is_none_or(|v| v.trim().is_empty()))
            .count();
        if count > 0 {
            result
                .errors
                .push(format!("Column '{column}' has {count} missing values"));
        }
    }

    log::debug!(
        "Validated {} rows: {} valid, {} invalid, {} warnings",
        table.len(),
        result.valid_rows,
        result.invalid_rows,
        result.warnings.len()
    );

    result
}

/// Reads and validates a CSV file. Read failures are reported as a
/// validation error rather than returned.
#[must_use]
pub fn validate_csv_file(path: &Path) -> ValidationResult {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ValidationResult::error(format!("File not found: {}", path.display()));
        }
        Err(e) => {
            return ValidationResult::error(format!("Error reading CSV file: {e}"));
        }
    };

    match RecordTable::from_csv_reader(file) {
        Ok(table) => validate(&table),
        Err(e) => ValidationResult::error(format!("Error reading CSV file: {e}")),
    }
}

struct Columns {
    city: usize,
    dd_lat: usize,
    dd_long: usize,
    dms_lat: usize,
    dms_long: usize,
}

impl Columns {
    /// Only called once every standard column is known to exist.
    fn resolve(table: &RecordTable) -> Self {
        let index = |c| table.column_index(c).unwrap_or_default();
        Self {
            city: index("city"),
            dd_lat: index("dd_lat"),
            dd_long: index("dd_long"),
            dms_lat: index("dms_lat"),
            dms_long: index("dms_long"),
        }
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    const fn column(self) -> &'static str {
        match self {
            Self::Latitude => "dd_lat",
            Self::Longitude => "dd_long",
        }
    }

    const fn dms_column(self) -> &'static str {
        match self {
            Self::Latitude => "dms_lat",
            Self::Longitude => "dms_long",
        }
    }

    const fn directions(self) -> [char; 2] {
        match self {
            Self::Latitude => ['N', 'S'],
            Self::Longitude => ['E', 'W'],
        }
    }
}

fn check_row(table: &RecordTable, columns: &Columns, row: usize) -> Vec<String> {
    let mut violations = Vec::new();

    if table
        .cell(row, columns.city)
        .is_none_or(|v| v.trim().is_empty())
    {
        violations.push("city: Field cannot be empty".to_string());
    }

    let lat = check_decimal(table.cell(row, columns.dd_lat), Axis::Latitude, &mut violations);
    let lon = check_decimal(table.cell(row, columns.dd_long), Axis::Longitude, &mut violations);
    check_dms(table.cell(row, columns.dms_lat), Axis::Latitude, lat, &mut violations);
    check_dms(table.cell(row, columns.dms_long), Axis::Longitude, lon, &mut violations);

    violations
}

/// Parses and range-checks a decimal coordinate, returning it if it parsed.
fn check_decimal(cell: Option<&str>, axis: Axis, violations: &mut Vec<String>) -> Option<f64> {
    let field = axis.column();
    let Some(raw) = cell.map(str::trim).filter(|v| !v.is_empty()) else {
        violations.push(format!("{field}: Field required"));
        return None;
    };
    let value = match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            violations.push(format!("{field}: Input should be a valid number, got '{raw}'"));
            return None;
        }
    };

    let (global_ok, taiwan_ok) = match axis {
        Axis::Latitude => (
            validate_coordinates(value, 0.0),
            is_in_taiwan(value, 121.0),
        ),
        Axis::Longitude => (
            validate_coordinates(0.0, value),
            is_in_taiwan(23.5, value),
        ),
    };
    let (name, global, local) = match axis {
        Axis::Latitude => ("Latitude", "-90 and 90", "21.5 to 25.5"),
        Axis::Longitude => ("Longitude", "-180 and 180", "119.5 to 122.5"),
    };
    if !global_ok {
        violations.push(format!("{field}: {name} must be between {global}, got {value}"));
    } else if !taiwan_ok {
        violations.push(format!(
            "{field}: {name} {value} is outside Taiwan bounds ({local})"
        ));
    }

    Some(value)
}

fn check_dms(cell: Option<&str>, axis: Axis, decimal: Option<f64>, violations: &mut Vec<String>) {
    let field = axis.dms_column();
    let Some(raw) = cell.map(str::trim).filter(|v| !v.is_empty()) else {
        violations.push(format!("{field}: DMS field cannot be empty"));
        return;
    };

    if !(raw.contains('°') && raw.contains('\'') && raw.contains('"')) {
        violations.push(format!(
            "{field}: Invalid DMS format: {raw}. Must contain °, ', and \""
        ));
        return;
    }

    let [positive, negative] = axis.directions();
    if !raw.ends_with([positive, negative]) {
        violations.push(format!(
            "{field}: Invalid DMS format: {raw}. Must end with {positive} or {negative}"
        ));
        return;
    }

    match (dms_to_decimal(raw), decimal) {
        (Err(e), _) => violations.push(format!("{field}: Invalid DMS format: {raw}. {e}")),
        (Ok(parsed), Some(expected)) if (parsed - expected).abs() > DMS_TOLERANCE => {
            violations.push(format!(
                "{field}: {raw} does not match {} {expected}",
                axis.column()
            ));
        }
        _ => {}
    }
}

/// Positions of every row that shares its duplicate key with another row.
fn duplicate_rows(table: &RecordTable) -> Vec<usize> {
    let indices: Vec<Option<usize>> = DUPLICATE_COLUMNS
        .iter()
        .map(|c| table.column_index(c))
        .collect();

    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for row in 0..table.len() {
        let key = indices
            .iter()
            .map(|index| {
                let cell = index.and_then(|i| table.cell(row, i)).unwrap_or_default().trim();
                // "25.0" and "25.00" are the same coordinate.
                cell.parse::<f64>()
                    .map_or_else(|_| cell.to_string(), |v| v.to_string())
            })
            .collect();
        groups.entry(key).or_default().push(row);
    }

    let mut rows: Vec<usize> = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flatten()
        .collect();
    rows.sort_unstable();
    rows
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tw_parking_source_models::StandardRecord;

    use super::*;

    fn taipei_101() -> StandardRecord {
        StandardRecord::new("Taipei City", "信義區", "Songren Rd", 25.0330, 121.5654)
    }

    fn table_of(records: &[StandardRecord]) -> RecordTable {
        RecordTable::from_records(records)
    }

    #[test]
    fn accepts_well_formed_records() {
        let result = validate(&table_of(&[
            taipei_101(),
            StandardRecord::new("New Taipei City", "", "", 25.0120, 121.4650),
        ]));
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.valid_rows, 2);
        assert_eq!(result.invalid_rows, 0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn latitude_outside_taiwan_is_an_error() {
        let result = validate(&table_of(&[StandardRecord::new(
            "Taipei City",
            "",
            "",
            50.0,
            121.5,
        )]));
        assert!(!result.is_valid());
        assert_eq!(result.invalid_rows, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Row 0: dd_lat: Latitude 50 is outside Taiwan bounds"));
    }

    #[test]
    fn aggregates_all_violations_of_a_row() {
        let table = RecordTable::new(
            STANDARD_COLUMNS.iter().map(ToString::to_string).collect(),
            vec![vec![
                None,
                Some("信義區".to_string()),
                None,
                Some("91".to_string()),
                Some("abc".to_string()),
                Some("25 01 58N".to_string()),
                Some("121°33'55.44\"N".to_string()),
            ]],
        );
        let result = validate(&table);

        assert_eq!(result.invalid_rows, 1);
        let row_error = &result.errors[0];
        assert!(row_error.starts_with("Row 0: city: Field cannot be empty; "));
        assert!(row_error.contains("dd_lat: Latitude must be between -90 and 90, got 91"));
        assert!(row_error.contains("dd_long: Input should be a valid number, got 'abc'"));
        assert!(row_error.contains("dms_lat: Invalid DMS format: 25 01 58N. Must contain"));
        assert!(row_error.contains("dms_long: Invalid DMS format: 121°33'55.44\"N. Must end with E or W"));

        assert!(result.errors.contains(&"Column 'city' has 1 missing values".to_string()));
        assert!(!result.errors.iter().any(|e| e.contains("'road'")));
    }

    #[test]
    fn dms_must_mirror_decimal() {
        let mut record = taipei_101();
        record.dd_lat = 24.0;
        let result = validate(&table_of(&[record]));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("dms_lat: 25°01'58.80\"N does not match dd_lat 24"));
    }

    #[test]
    fn missing_columns_stop_validation() {
        let table = RecordTable::new(
            vec!["city".to_string(), "area".to_string()],
            vec![vec![None, None]],
        );
        let result = validate(&table);
        assert_eq!(
            result.errors,
            vec!["Missing required columns: road, dd_lat, dd_long, dms_lat, dms_long"]
        );
        assert_eq!(result.valid_rows + result.invalid_rows, 0);
    }

    #[test]
    fn empty_table_is_a_warning() {
        let result = validate(&table_of(&[]));
        assert!(result.is_valid());
        assert_eq!(result.warnings, vec!["Table is empty"]);
    }

    #[test]
    fn duplicates_are_warnings_with_positions() {
        let other = StandardRecord::new("Taipei City", "大安區", "Xinyi Rd", 25.0260, 121.5430);
        let result = validate(&table_of(&[
            taipei_101(),
            other.clone(),
            taipei_101(),
            other,
            StandardRecord::new("Taipei City", "大安區", "Heping Rd", 25.0260, 121.5430),
        ]));

        assert!(result.is_valid());
        assert_eq!(
            result.warnings,
            vec!["Found 4 duplicate rows", "Duplicate row indices: [0, 1, 2, 3]"]
        );
    }

    #[test]
    fn summary_lists_counts() {
        let result = validate(&table_of(&[taipei_101()]));
        assert_eq!(
            result.summary(),
            "Validation Summary:\n  Valid rows: 1\n  Invalid rows: 0\n  Errors: 0\n  Warnings: 0"
        );
    }

    #[test]
    fn validates_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parking.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "\u{feff}city,area,road,dd_lat,dd_long,dms_lat,dms_long\n\
             Taipei City,信義區,Songren Rd,25.033,121.5654,\"25°01'58.80\"\"N\",\"121°33'55.44\"\"E\"\n"
        )
        .unwrap();
        drop(file);

        let result = validate_csv_file(&path);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.valid_rows, 1);

        let missing = validate_csv_file(&dir.path().join("nope.csv"));
        assert!(!missing.is_valid());
        assert!(missing.errors[0].starts_with("File not found: "));
    }
}
