//! Zipped ESRI shapefile handler.
//!
//! Downloads a ZIP bundle, reads the first `.shp` with its sibling `.dbf`
//! (and `.prj` / `.cpg` when present), and yields one row per shape. The
//! archive bytes are cached as `<md5(url)>.zip` once they have been read
//! successfully.
//!
//! Attribute text is decoded with the configured encoding, else the `.cpg`
//! code page, else the `.dbf` header's code page mark, else UTF-8.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use dbase::yore::CodePage;
use dbase::yore::code_pages::CP437;
use dbase::{CodePageMark, FieldValue};
use encoding_rs::Encoding;
use shapefile::{PolygonRing, Shape};
use tw_parking_geography::CoordinateSystem;
use tw_parking_source_models::{
    DataFormat, FetchReport, FilterRule, SourceConfig, StandardRecord, TransformReport,
};

use crate::http::ARCHIVE_TIMEOUT;
use crate::registry::HandlerDefaults;
use crate::transform::RowTransformer;
use crate::{
    HandlerContext, RawFields, RawRow, RawTable, RowLocation, SourceError, SourceHandler,
    config_error, filter,
};

/// The component files of one shapefile.
#[derive(Debug)]
pub struct ShapefileParts {
    /// Archive entry name of the `.shp`.
    pub name: String,
    /// Geometry file.
    pub shp: Vec<u8>,
    /// Attribute table.
    pub dbf: Vec<u8>,
    /// Projection definition, if bundled.
    pub prj: Option<String>,
    /// Code page of the attribute table, if bundled.
    pub cpg: Option<String>,
}

/// Handler for a ZIP archive containing a shapefile.
pub struct ShapefileZipHandler {
    id: String,
    url: String,
    filter: Option<FilterRule>,
    encoding: Option<&'static Encoding>,
    transformer: RowTransformer,
    context: HandlerContext,
}

impl ShapefileZipHandler {
    /// Builds the handler for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the URL is missing, the format is
    /// not a shapefile, the encoding is unknown, or no city source is
    /// available.
    pub fn new(
        config: &SourceConfig,
        context: &HandlerContext,
        defaults: &HandlerDefaults,
    ) -> Result<Self, SourceError> {
        let handler = &config.config;
        if handler.url.trim().is_empty() {
            return Err(config_error(config, "config.url is required"));
        }
        if let Some(format) = handler.format
            && format != DataFormat::Shapefile
        {
            return Err(config_error(
                config,
                format!("format '{format}' is not a shapefile archive"),
            ));
        }

        let encoding = match handler.encoding.as_deref() {
            Some(label) => Some(encoding_for_label(label).ok_or_else(|| {
                config_error(config, format!("unknown text encoding '{label}'"))
            })?),
            None => None,
        };

        Ok(Self {
            id: config.id.clone(),
            url: handler.url.trim().to_string(),
            filter: handler.filter_rule().or_else(|| defaults.filter.clone()),
            encoding,
            transformer: RowTransformer::new(config, defaults.city.as_deref())?,
            context: context.clone(),
        })
    }
}

#[async_trait]
impl SourceHandler for ShapefileZipHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_data(&self) -> Result<RawTable, SourceError> {
        let label = &self.id;
        let mut report = FetchReport::default();

        let cached = self.context.cache.load(&self.url, "zip");
        report.from_cache = cached.is_some();
        let bytes = if let Some(bytes) = cached {
            bytes
        } else {
            log::info!("[{label}] Downloading from {}", self.url);
            self.context
                .progress
                .set_message(format!("[{label}] downloading archive"));
            let bytes = self
                .context
                .http
                .get_bytes(&self.url, ARCHIVE_TIMEOUT)
                .await?;
            log::info!("[{label}] Downloaded {} bytes", bytes.len());
            report.pages_fetched = 1;
            bytes
        };

        let parts = extract_shapefile(&bytes)?;
        log::info!("[{label}] Reading shapefile: {}", parts.name);

        let embedded_system = parts.prj.as_deref().and_then(system_from_prj);
        match (&parts.prj, embedded_system) {
            (Some(_), Some(system)) => log::info!("[{label}] Projection file declares {system}"),
            (Some(_), None) => log::warn!("[{label}] Unrecognized projection in .prj, ignoring"),
            (None, _) => log::debug!("[{label}] No .prj in archive"),
        }

        let cpg_encoding = parts.cpg.as_deref().and_then(|cpg| {
            let encoding = encoding_for_label(cpg);
            if encoding.is_none() {
                log::warn!("[{label}] Unrecognized code page '{}' in .cpg, ignoring", cpg.trim());
            }
            encoding
        });

        let table = read_rows(parts.shp, parts.dbf, self.encoding.or(cpg_encoding))?;
        log::debug!("[{label}] Attribute text decoded as {}", table.encoding.name());
        if table.decode_errors > 0 {
            log::warn!(
                "[{label}] {} attribute values are not valid {}; invalid bytes were replaced",
                table.decode_errors,
                table.encoding.name()
            );
        }
        report.text_decode_errors = table.decode_errors;
        let rows = table.rows;
        report.rows_received = rows.len() as u64;
        log::info!("[{label}] Loaded {} records from shapefile", rows.len());

        if !report.from_cache
            && let Err(e) = self.context.cache.store(&self.url, "zip", &bytes)
        {
            log::warn!("[{label}] Failed to cache archive: {e}");
        }

        let rows = match &self.filter {
            Some(rule) => filter::apply(label, rule, rows)?,
            None => rows,
        };
        report.rows_kept = rows.len() as u64;

        Ok(RawTable {
            rows,
            embedded_system,
            report,
        })
    }

    fn transform_data(
        &self,
        table: RawTable,
    ) -> Result<(Vec<StandardRecord>, TransformReport), SourceError> {
        Ok(self.transformer.apply(&table))
    }
}

/// Pulls the first shapefile and its siblings out of a ZIP archive.
///
/// # Errors
///
/// Returns [`SourceError::Zip`] if the bytes are not a readable archive and
/// [`SourceError::Archive`] if no `.shp` or no matching `.dbf` is present.
pub fn extract_shapefile(bytes: &[u8]) -> Result<ShapefileParts, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    log::debug!("ZIP archive contains {} files", names.len());

    let shp_name = names
        .iter()
        .find(|name| name.to_ascii_lowercase().ends_with(".shp"))
        .cloned()
        .ok_or_else(|| SourceError::Archive {
            message: "No .shp file found in ZIP archive".to_string(),
        })?;
    let stem = &shp_name[..shp_name.len() - ".shp".len()];
    let sibling = |ext: &str| {
        names
            .iter()
            .find(|name| {
                name.strip_prefix(stem)
                    .is_some_and(|rest| rest.eq_ignore_ascii_case(ext))
            })
            .cloned()
    };

    let dbf_name = sibling(".dbf").ok_or_else(|| SourceError::Archive {
        message: format!("No .dbf file found for {shp_name}"),
    })?;
    let prj_name = sibling(".prj");
    let cpg_name = sibling(".cpg");

    let shp = read_entry(&mut archive, &shp_name)?;
    let dbf = read_entry(&mut archive, &dbf_name)?;
    let mut read_text = |name: Option<String>| -> Result<Option<String>, SourceError> {
        match name {
            Some(name) => Ok(Some(
                String::from_utf8_lossy(&read_entry(&mut archive, &name)?).into_owned(),
            )),
            None => Ok(None),
        }
    };
    let prj = read_text(prj_name)?;
    let cpg = read_text(cpg_name)?;

    Ok(ShapefileParts {
        name: shp_name,
        shp,
        dbf,
        prj,
        cpg,
    })
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, SourceError> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Identifies the coordinate system declared by a `.prj` WKT string.
///
/// Geographic definitions (`GEOGCS`) map to WGS84; projected definitions
/// naming TWD97 or a Transverse Mercator on meridian 121 map to TWD97.
#[must_use]
pub fn system_from_prj(wkt: &str) -> Option<CoordinateSystem> {
    let compact: String = wkt
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if compact.starts_with("GEOGCS") {
        return Some(CoordinateSystem::Wgs84);
    }
    if compact.starts_with("PROJCS")
        && (compact.contains("TWD97")
            || compact.contains("TWD_1997")
            || (compact.contains("TRANSVERSE_MERCATOR")
                && compact.contains("\"CENTRAL_MERIDIAN\",121")))
    {
        return Some(CoordinateSystem::Twd97);
    }
    None
}

/// Resolves a code page label as written in `.cpg` files.
///
/// Accepts encoding labels (`big5`, `UTF-8`) and Windows code page numbers
/// with an optional `CP` or `ANSI` prefix (`950`, `CP950`, `ANSI 1252`).
#[must_use]
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
        return Some(encoding);
    }
    let upper = label.to_ascii_uppercase();
    let number = upper
        .strip_prefix("ANSI")
        .or_else(|| upper.strip_prefix("CP"))
        .unwrap_or(&upper)
        .trim();
    match number {
        "65001" => Some(encoding_rs::UTF_8),
        "950" => Some(encoding_rs::BIG5),
        "936" => Some(encoding_rs::GBK),
        "932" => Some(encoding_rs::SHIFT_JIS),
        "949" => Some(encoding_rs::EUC_KR),
        "1252" => Some(encoding_rs::WINDOWS_1252),
        _ => None,
    }
}

/// Offset of the language driver (code page) byte in a `.dbf` header.
const LANGUAGE_DRIVER_OFFSET: usize = 29;

/// Encoding named by a `.dbf` header's language driver byte.
fn encoding_for_mark(mark: CodePageMark) -> Option<&'static Encoding> {
    match mark {
        CodePageMark::Utf8 => Some(encoding_rs::UTF_8),
        CodePageMark::CP950 => Some(encoding_rs::BIG5),
        CodePageMark::CP936 => Some(encoding_rs::GBK),
        CodePageMark::CP932 => Some(encoding_rs::SHIFT_JIS),
        CodePageMark::CP949 => Some(encoding_rs::EUC_KR),
        CodePageMark::CP1252 => Some(encoding_rs::WINDOWS_1252),
        _ => None,
    }
}

/// Decodes `.dbf` text in the resolved encoding.
///
/// The table is read through CP437, which maps every byte to a distinct
/// char, so encoding a value back to CP437 recovers its raw bytes.
struct AttributeText {
    encoding: &'static Encoding,
    decode_errors: u64,
}

impl AttributeText {
    fn decode(&mut self, raw: &str) -> String {
        let bytes = CP437.encode_lossy(raw, b'?');
        let (text, had_errors) = self.encoding.decode_without_bom_handling(&bytes);
        if had_errors {
            self.decode_errors += 1;
        }
        text.into_owned()
    }
}

/// Rows read from a shapefile and how their text was decoded.
struct AttributeRows {
    rows: Vec<RawRow>,
    encoding: &'static Encoding,
    decode_errors: u64,
}

/// Reads every shape and attribute record. `encoding` overrides the code
/// page declared in the `.dbf` header.
fn read_rows(
    shp: Vec<u8>,
    mut dbf: Vec<u8>,
    encoding: Option<&'static Encoding>,
) -> Result<AttributeRows, SourceError> {
    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp))?;

    let declared_mark = dbf
        .get(LANGUAGE_DRIVER_OFFSET)
        .map(|byte| CodePageMark::from(*byte));
    // The reader refuses code pages it cannot decode itself; decoding
    // happens here instead.
    if let Some(byte) = dbf.get_mut(LANGUAGE_DRIVER_OFFSET) {
        *byte = 0;
    }
    let mut dbase_reader =
        dbase::Reader::new(Cursor::new(dbf)).map_err(|e| SourceError::Archive {
            message: format!("Unreadable .dbf: {e}"),
        })?;
    dbase_reader.set_encoding(CP437);

    let mut text = AttributeText {
        encoding: encoding
            .or_else(|| declared_mark.and_then(encoding_for_mark))
            .unwrap_or(encoding_rs::UTF_8),
        decode_errors: 0,
    };
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);

    let mut rows = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;
        let mut fields = RawFields::new();
        for (name, value) in record {
            fields.insert(name, field_value_to_json(value, &mut text));
        }
        rows.push(RawRow {
            fields,
            location: shape_location(&shape),
        });
    }
    Ok(AttributeRows {
        rows,
        encoding: text.encoding,
        decode_errors: text.decode_errors,
    })
}

fn field_value_to_json(value: FieldValue, text: &mut AttributeText) -> serde_json::Value {
    use serde_json::Value;

    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => Value::String(text.decode(&s)),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number_to_json(n)
        }
        FieldValue::Float(Some(n)) => number_to_json(f64::from(n)),
        FieldValue::Integer(n) => Value::from(n),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        // Dates and empty values carry nothing the mapping reads.
        _ => Value::Null,
    }
}

/// Whole numbers stay integers so district codes read back as `63000050`,
/// not `63000050.0`.
#[allow(clippy::cast_possible_truncation)]
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

/// Converts a shape into the row's coordinate source.
fn shape_location(shape: &Shape) -> RowLocation {
    let geometry = match shape {
        Shape::NullShape => None,
        Shape::Point(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointM(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointZ(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::Multipoint(m) => multipoint(m.points(), |p| Coord { x: p.x, y: p.y }),
        Shape::MultipointM(m) => multipoint(m.points(), |p| Coord { x: p.x, y: p.y }),
        Shape::MultipointZ(m) => multipoint(m.points(), |p| Coord { x: p.x, y: p.y }),
        Shape::Polyline(l) => polyline(l.parts(), |p| Coord { x: p.x, y: p.y }),
        Shape::PolylineM(l) => polyline(l.parts(), |p| Coord { x: p.x, y: p.y }),
        Shape::PolylineZ(l) => polyline(l.parts(), |p| Coord { x: p.x, y: p.y }),
        Shape::Polygon(p) => polygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
        Shape::PolygonM(p) => polygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
        Shape::PolygonZ(p) => polygon(p.rings(), |p| Coord { x: p.x, y: p.y }),
        Shape::Multipatch(_) => return RowLocation::Unsupported("Multipatch".to_string()),
    };
    RowLocation::Geometry(geometry)
}

fn multipoint<P>(points: &[P], xy: fn(&P) -> Coord<f64>) -> Option<Geometry<f64>> {
    if points.is_empty() {
        return None;
    }
    Some(Geometry::MultiPoint(MultiPoint::new(
        points.iter().map(|p| Point::from(xy(p))).collect(),
    )))
}

fn polyline<P>(parts: &[Vec<P>], xy: fn(&P) -> Coord<f64>) -> Option<Geometry<f64>> {
    if parts.iter().all(Vec::is_empty) {
        return None;
    }
    Some(Geometry::MultiLineString(MultiLineString::new(
        parts
            .iter()
            .map(|part| part.iter().map(xy).collect::<LineString<f64>>())
            .collect(),
    )))
}

/// Outer rings start a new polygon; inner rings are holes of the last one.
fn polygon<P>(rings: &[PolygonRing<P>], xy: fn(&P) -> Coord<f64>) -> Option<Geometry<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        let line: LineString<f64> = ring.points().iter().map(xy).collect();
        match ring {
            PolygonRing::Outer(_) => polygons.push(Polygon::new(line, vec![])),
            PolygonRing::Inner(_) => {
                if let Some(last) = polygons.last_mut() {
                    last.interiors_push(line);
                }
            }
        }
    }

    if polygons.is_empty() {
        None
    } else {
        Some(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
    }
}
