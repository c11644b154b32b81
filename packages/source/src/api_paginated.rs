//! Paginated HTTP API handler.
//!
//! Requests `?page={n}&size={page_size}` until the API returns an empty or
//! short page, up to [`MAX_PAGES`]. Pages are JSON (a bare array, or an
//! object wrapping the array under `data`, `records` or `results`) or CSV.
//! The complete, unfiltered row set is cached as `<md5(url)>.json`.

use async_trait::async_trait;
use tw_parking_source_models::{
    DataFormat, FetchReport, FilterRule, SourceConfig, StandardRecord, TransformReport,
};

use crate::http::PAGE_TIMEOUT;
use crate::registry::HandlerDefaults;
use crate::transform::RowTransformer;
use crate::{
    HandlerContext, RawFields, RawRow, RawTable, SourceError, SourceHandler, config_error, filter,
};

/// Safety cap on the number of pages requested per run.
pub const MAX_PAGES: u32 = 100;

/// Page size used when the config does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Keys under which wrapped JSON responses carry their record array.
const WRAPPER_KEYS: [&str; 3] = ["data", "records", "results"];

/// Body format of each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageFormat {
    Json,
    Csv,
}

/// Handler for paginated JSON or CSV APIs.
pub struct ApiPaginatedHandler {
    id: String,
    url: String,
    format: PageFormat,
    page_size: u32,
    filter: Option<FilterRule>,
    transformer: RowTransformer,
    context: HandlerContext,
}

impl ApiPaginatedHandler {
    /// Builds the handler for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the URL is missing, the page size
    /// is zero, the format is not a paginated one, or no city source is
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

        let format = match handler.format {
            None | Some(DataFormat::JsonPaginated) => PageFormat::Json,
            Some(DataFormat::CsvPaginated) => PageFormat::Csv,
            Some(other) => {
                return Err(config_error(
                    config,
                    format!("format '{other}' is not a paginated API format"),
                ));
            }
        };

        let page_size = handler.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(config_error(config, "config.page_size must be positive"));
        }

        Ok(Self {
            id: config.id.clone(),
            url: handler.url.trim().to_string(),
            format,
            page_size,
            filter: handler.filter_rule().or_else(|| defaults.filter.clone()),
            transformer: RowTransformer::new(config, defaults.city.as_deref())?,
            context: context.clone(),
        })
    }

    /// URL of the zero-based page `page`.
    #[must_use]
    pub fn page_url(&self, page: u32) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}page={page}&size={}",
            self.url, self.page_size
        )
    }

    fn cached_rows(&self) -> Option<Vec<RawFields>> {
        let bytes = self.context.cache.load(&self.url, "json")?;
        match serde_json::from_slice(&bytes) {
            Ok(rows) => Some(rows),
            Err(e) => {
                log::warn!("[{}] Ignoring unreadable cache entry: {e}", self.id);
                None
            }
        }
    }

    fn store_rows(&self, rows: &[RawFields]) {
        if !self.context.cache.is_enabled() {
            return;
        }
        let result = serde_json::to_vec(rows)
            .map_err(SourceError::from)
            .and_then(|bytes| {
                self.context
                    .cache
                    .store(&self.url, "json", &bytes)
                    .map_err(SourceError::from)
            });
        if let Err(e) = result {
            log::warn!("[{}] Failed to cache fetched rows: {e}", self.id);
        }
    }

    async fn fetch_pages(&self, report: &mut FetchReport) -> Result<Vec<RawFields>, SourceError> {
        let label = &self.id;
        let page_size = self.page_size as usize;
        let mut rows = Vec::new();
        let mut reached_end = false;

        for page in 0..MAX_PAGES {
            let url = self.page_url(page);
            log::info!("[{label}] Fetching page {page} from {url}");
            self.context
                .progress
                .set_message(format!("[{label}] page {page}"));

            let page_rows = match self.fetch_page(&url).await {
                Ok(page_rows) => page_rows,
                Err(e) if page == 0 => {
                    log::error!("[{label}] Error fetching page {page}: {e}");
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("[{label}] Stopping pagination due to error on page {page}: {e}");
                    report.truncated_by = Some(e.to_string());
                    break;
                }
            };

            report.pages_fetched += 1;
            let count = page_rows.len();
            rows.extend(page_rows);
            log::info!(
                "[{label}] Page {page}: received {count} records (total: {})",
                rows.len()
            );

            if count == 0 {
                log::info!("[{label}] No more data at page {page}, stopping pagination");
                reached_end = true;
                break;
            }
            if count < page_size {
                log::info!("[{label}] Received fewer records than page size, stopping pagination");
                reached_end = true;
                break;
            }
        }

        if !reached_end && report.truncated_by.is_none() {
            log::warn!("[{label}] Stopped at the {MAX_PAGES}-page safety cap");
            report.hit_page_cap = true;
        }

        if report.truncated_by.is_none() {
            self.store_rows(&rows);
        }

        Ok(rows)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<RawFields>, SourceError> {
        let body = self.context.http.get_text(url, PAGE_TIMEOUT).await?;
        match self.format {
            PageFormat::Json => parse_json_page(&body),
            PageFormat::Csv => parse_csv_page(&body),
        }
    }
}

#[async_trait]
impl SourceHandler for ApiPaginatedHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_data(&self) -> Result<RawTable, SourceError> {
        let label = &self.id;
        let mut report = FetchReport::default();

        let raw = if let Some(rows) = self.cached_rows() {
            report.from_cache = true;
            rows
        } else {
            self.fetch_pages(&mut report).await?
        };

        report.rows_received = raw.len() as u64;
        let rows: Vec<RawRow> = raw.into_iter().map(RawRow::from_fields).collect();
        let rows = match &self.filter {
            Some(rule) => filter::apply(label, rule, rows)?,
            None => rows,
        };
        report.rows_kept = rows.len() as u64;

        log::info!(
            "[{label}] Total records fetched: {} ({} after filtering, {} pages)",
            report.rows_received,
            report.rows_kept,
            report.pages_fetched
        );
        if report.rows_received == 0 {
            log::warn!("[{label}] No records retrieved from API");
        }

        Ok(RawTable {
            rows,
            embedded_system: None,
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

/// Extracts the records of one JSON page.
fn parse_json_page(body: &str) -> Result<Vec<RawFields>, SourceError> {
    let items = match serde_json::from_str(body)? {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut wrapper) => {
            let array = WRAPPER_KEYS
                .iter()
                .find(|key| wrapper.get(**key).is_some_and(serde_json::Value::is_array))
                .and_then(|key| wrapper.remove(*key));
            match array {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(SourceError::UnexpectedResponse {
                        message: format!(
                            "expected a record array under one of {WRAPPER_KEYS:?}, got keys {:?}",
                            wrapper.keys().collect::<Vec<_>>()
                        ),
                    });
                }
            }
        }
        other => {
            return Err(SourceError::UnexpectedResponse {
                message: format!("expected a JSON array or object, got {other}"),
            });
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(fields) => Some(fields),
            other => {
                log::debug!("Skipping non-object record {other}");
                None
            }
        })
        .collect())
}

/// Extracts the records of one CSV page. A blank body is an empty page.
fn parse_csv_page(body: &str) -> Result<Vec<RawFields>, SourceError> {
    let body = body.trim_start_matches('\u{feff}');
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut fields = RawFields::new();
        for (i, header) in headers.iter().enumerate() {
            let value = record.get(i).unwrap_or("").trim().to_owned();
            fields.insert(header.clone(), serde_json::Value::String(value));
        }
        rows.push(fields);
    }

    Ok(rows)
}
