//! Google Sheets backend over the v4 `values` API.
//!
//! The report log and the geocode cache are two ranges (usually two tabs) of
//! the same spreadsheet. Row 1 of each range is a header row; appending to an
//! empty range writes the header first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CACHE_HEADERS, CacheRow, CacheStore, REPORT_HEADERS, ReportLog};
use crate::fetch::{HttpClient, fetch_text};
use crate::report::{IncidentType, Report};

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Accepted header names per report field, in `REPORT_HEADERS` order.
const REPORT_COLUMNS: [&[&str]; 5] = [
    &["timestamp", "date", "horodatage"],
    &["station", "lieu", "gare"],
    &["line", "ligne"],
    &["incident_type", "type_incident", "type"],
    &["comment", "commentaire"],
];

/// Accepted header names per cache field, in `CACHE_HEADERS` order.
const CACHE_COLUMNS: [&[&str]; 3] = [
    &["lieu", "station", "name", "nom"],
    &["lat", "latitude"],
    &["lon", "lng", "longitude"],
];

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a [String]; 1],
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

pub struct SheetsStore<C> {
    client: C,
    base_url: String,
    spreadsheet_id: String,
    report_range: String,
    cache_range: String,
    /// Ranges known to start with a header row. Held across an append so
    /// concurrent first writes emit one header.
    headed: Mutex<HashSet<String>>,
}

impl<C: HttpClient> SheetsStore<C> {
    /// `client` is expected to carry credentials, e.g. a
    /// [`Bearer`](crate::fetch::auth::Bearer) or
    /// [`ApiKey`](crate::fetch::auth::ApiKey) wrapper.
    pub fn new(client: C, spreadsheet_id: &str, report_range: &str, cache_range: &str) -> Self {
        Self {
            client,
            base_url: SHEETS_API_URL.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            report_range: report_range.to_string(),
            cache_range: cache_range.to_string(),
            headed: Mutex::new(HashSet::new()),
        }
    }

    /// Points the store at another API root (a proxy or a test server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("{} cannot be a base URL", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, last_segment: &str) -> Result<Url> {
        self.api_url(&[self.spreadsheet_id.as_str(), "values", last_segment])
    }

    /// Creates the cache worksheet with its header row when the spreadsheet
    /// has no tab of that name.
    #[tracing::instrument(skip(self), fields(range = %self.cache_range))]
    pub async fn ensure_cache_sheet(&self) -> Result<()> {
        let title = sheet_title(&self.cache_range);
        if self.sheet_titles().await?.iter().any(|t| t == title) {
            debug!("Cache worksheet present");
            return Ok(());
        }

        let url = self.api_url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;
        let body = json!({"requests": [{"addSheet": {"properties": {"title": title}}}]});
        fetch_text(&self.client, json_request(url, &body)?)
            .await
            .with_context(|| format!("failed to create worksheet '{title}'"))?;
        info!(title, "Created cache worksheet");

        let mut headed = self.headed.lock().await;
        self.post_append(&self.cache_range, &strings(&CACHE_HEADERS))
            .await?;
        headed.insert(self.cache_range.clone());
        Ok(())
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let mut url = self.api_url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let body = fetch_text(&self.client, Request::new(Method::GET, url)).await?;
        let parsed: Spreadsheet =
            serde_json::from_str(&body).context("unexpected Sheets spreadsheet response")?;
        Ok(parsed
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    /// All rows of `range` as strings, header row included.
    #[tracing::instrument(skip(self))]
    async fn get_rows(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(range)?;
        let body = fetch_text(&self.client, Request::new(Method::GET, url)).await?;
        let parsed: ValueRange =
            serde_json::from_str(&body).context("unexpected Sheets values response")?;

        let rows: Vec<Vec<String>> = parsed
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        debug!(rows = rows.len(), "Fetched sheet rows");
        Ok(rows)
    }

    /// Appends `row`, first writing `headers` if the range is still empty.
    #[tracing::instrument(skip(self, headers, row))]
    async fn append_row(&self, range: &str, headers: &[&str], row: &[String]) -> Result<()> {
        let mut headed = self.headed.lock().await;
        if !headed.contains(range) {
            if self.get_rows(range).await?.is_empty() {
                debug!("Empty range, writing header row");
                self.post_append(range, &strings(headers)).await?;
            }
            headed.insert(range.to_string());
        }
        self.post_append(range, row).await
    }

    async fn post_append(&self, range: &str, row: &[String]) -> Result<()> {
        let mut url = self.values_url(&format!("{range}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        fetch_text(&self.client, json_request(url, &AppendBody { values: [row] })?).await?;
        Ok(())
    }
}

fn json_request<T: Serialize>(url: Url, body: &T) -> Result<Request> {
    let mut req = Request::new(Method::POST, url);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    Ok(req)
}

/// Worksheet name of an A1 range: `'Cache tab'!A:C` is `Cache tab`.
fn sheet_title(range: &str) -> &str {
    let sheet = range.rsplit_once('!').map_or(range, |(sheet, _)| sheet);
    sheet
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(sheet)
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Maps each field to a column by header name (any of its aliases).
///
/// Once the header is recognised, fields it does not name read as empty; a
/// header with no known name at all falls back to field order.
fn column_index(header: &[String], fields: &[&[&str]]) -> Vec<Option<usize>> {
    let lowered: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let found: Vec<Option<usize>> = fields
        .iter()
        .map(|aliases| {
            aliases
                .iter()
                .find_map(|alias| lowered.iter().position(|h| h.as_str() == *alias))
        })
        .collect();

    if found.iter().all(Option::is_none) {
        return (0..fields.len()).map(Some).collect();
    }
    found
}

fn cell(row: &[String], index: Option<usize>) -> &str {
    index
        .and_then(|i| row.get(i))
        .map(String::as_str)
        .unwrap_or("")
}

fn report_from_row(row: &[String], columns: &[Option<usize>]) -> Option<Report> {
    let incident_type = IncidentType::from_label(cell(row, columns[3]))?;
    let line = cell(row, columns[2]).trim();
    Some(Report {
        timestamp: cell(row, columns[0]).to_string(),
        station: cell(row, columns[1]).to_string(),
        line: (!line.is_empty()).then(|| line.to_string()),
        incident_type,
        comment: cell(row, columns[4]).to_string(),
    })
}

fn report_to_row(report: &Report) -> Vec<String> {
    vec![
        report.timestamp.clone(),
        report.station.clone(),
        report.line.clone().unwrap_or_default(),
        report.incident_type.label().to_string(),
        report.comment.clone(),
    ]
}

#[async_trait]
impl<C: HttpClient> ReportLog for SheetsStore<C> {
    async fn append(&self, report: &Report) -> Result<()> {
        self.append_row(&self.report_range, &REPORT_HEADERS, &report_to_row(report))
            .await
    }

    async fn all(&self) -> Result<Vec<Report>> {
        let rows = self.get_rows(&self.report_range).await?;
        let Some((header, data)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        let columns = column_index(header, &REPORT_COLUMNS);

        let mut reports = Vec::with_capacity(data.len());
        for (index, row) in data.iter().enumerate() {
            match report_from_row(row, &columns) {
                Some(report) => reports.push(report),
                None => warn!(row = index + 2, "Skipping sheet row with unknown incident type"),
            }
        }
        Ok(reports)
    }
}

#[async_trait]
impl<C: HttpClient> CacheStore for SheetsStore<C> {
    async fn entries(&self) -> Result<Vec<CacheRow>> {
        let rows = self.get_rows(&self.cache_range).await?;
        let Some((header, data)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        let columns = column_index(header, &CACHE_COLUMNS);

        Ok(data
            .iter()
            .map(|row| CacheRow {
                name: cell(row, columns[0]).to_string(),
                lat: cell(row, columns[1]).to_string(),
                lon: cell(row, columns[2]).to_string(),
            })
            .collect())
    }

    async fn append(&self, row: CacheRow) -> Result<()> {
        self.append_row(&self.cache_range, &CACHE_HEADERS, &[row.name, row.lat, row.lon])
            .await
    }
}
