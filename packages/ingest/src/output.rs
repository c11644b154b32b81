//! Output CSV reading and writing.
//!
//! The file is UTF-8 with a BOM so spreadsheet tools pick the right
//! encoding for district and road names.

use std::io::Write;
use std::path::{Path, PathBuf};

use tw_parking_source_models::StandardRecord;

use crate::IngestError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes `records` to `path`, creating parent directories. The file is
/// written next to `path` first and renamed into place.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_csv(path: &Path, records: &[StandardRecord]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::Writer::from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        if records.is_empty() {
            writer.write_record(tw_parking_source_models::STANDARD_COLUMNS)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;

    log::info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Reads records previously written by [`write_csv`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row does not match the
/// record schema.
pub fn read_csv(path: &Path) -> Result<Vec<StandardRecord>, IngestError> {
    let bytes = std::fs::read(path)?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut reader = csv::Reader::from_reader(body);
    let records = reader
        .deserialize()
        .collect::<Result<Vec<StandardRecord>, _>>()?;
    Ok(records)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<StandardRecord> {
        vec![
            StandardRecord::new("Taipei City", "信義區", "Songren Rd, Lane 5", 25.033, 121.5654),
            StandardRecord::new("New Taipei City", "", "", 25.012, 121.465),
        ]
    }

    #[test]
    fn writes_bom_and_standard_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/parking_locations.csv");

        write_csv(&path, &records()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("city,area,road,dd_lat,dd_long,dms_lat,dms_long")
        );
        assert_eq!(
            lines.next(),
            Some("Taipei City,信義區,\"Songren Rd, Lane 5\",25.033,121.5654,\"25°01'58.80\"\"N\",\"121°33'55.44\"\"E\"")
        );
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn reads_back_written_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parking.csv");
        write_csv(&path, &records()).unwrap();
        assert_eq!(read_csv(&path).unwrap(), records());
    }

    #[test]
    fn empty_output_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.trim_start_matches('\u{feff}').trim_end(),
            "city,area,road,dd_lat,dd_long,dms_lat,dms_long"
        );
        assert!(read_csv(&path).unwrap().is_empty());
    }
}
