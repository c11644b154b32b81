//! Untyped tabular view of a record CSV.
//!
//! Cells are kept as text so that malformed values can be reported rather
//! than rejected at parse time.

use std::io::Read;

use tw_parking_source_models::{STANDARD_COLUMNS, StandardRecord};

use crate::ValidateError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A header plus rows of optional text cells. `None` is a missing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RecordTable {
    /// Builds a table from raw parts. Short rows are treated as missing the
    /// trailing cells.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a table from typed records using the standard header.
    #[must_use]
    pub fn from_records(records: &[StandardRecord]) -> Self {
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Some(r.city.clone()),
                    Some(r.area.clone()),
                    Some(r.road.clone()),
                    Some(r.dd_lat.to_string()),
                    Some(r.dd_long.to_string()),
                    Some(r.dms_lat.clone()),
                    Some(r.dms_long.clone()),
                ]
            })
            .collect();
        Self {
            columns: STANDARD_COLUMNS.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    /// Reads a CSV with a header row. A leading UTF-8 BOM is skipped and
    /// empty cells become missing values.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or is not valid CSV.
    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Self, ValidateError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(body);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(
                record
                    .iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect(),
            );
        }

        Ok(Self { columns, rows })
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of `column` in the header.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell at (`row`, `column`), `None` when missing.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(Option::as_deref)
    }
}
