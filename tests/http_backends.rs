//! Nominatim and Google Sheets clients against local stand-in servers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use railradar::fetch::BasicClient;
use railradar::fetch::auth::ApiKey;
use railradar::geo::Coordinates;
use railradar::geocode::{GeocodeCache, GeocodeError, Geocoder, NominatimGeocoder, Source};
use railradar::report::{IncidentType, Report};
use railradar::store::{CACHE_HEADERS, CacheRow, CacheStore, REPORT_HEADERS, ReportLog, SheetsStore};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
}

fn client(timeout: Duration) -> BasicClient {
    BasicClient::new("railradar-test", timeout).expect("client")
}

async fn search(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    assert_eq!(params.get("format").map(String::as_str), Some("json"));
    assert_eq!(params.get("limit").map(String::as_str), Some("1"));
    assert_eq!(headers["user-agent"], "railradar-test");

    match params.get("q").map(String::as_str) {
        Some("Gare de Lyon, Paris") => (
            StatusCode::OK,
            Json(json!([{"lat": "48.8443", "lon": "2.3744", "display_name": "Gare de Lyon"}])),
        ),
        Some("slow") => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, Json(json!([])))
        }
        Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
        Some("garbled") => (StatusCode::OK, Json(json!([{"lat": "nord", "lon": "2.3"}]))),
        _ => (StatusCode::OK, Json(json!([]))),
    }
}

async fn nominatim() -> NominatimGeocoder<BasicClient> {
    let addr = spawn(Router::new().route("/search", get(search))).await;
    NominatimGeocoder::new(client(Duration::from_millis(300)), &format!("http://{addr}/"))
}

#[tokio::test]
async fn test_nominatim_parses_first_result() {
    let geocoder = nominatim().await;
    let found = geocoder.geocode("Gare de Lyon, Paris").await.unwrap();
    assert_eq!(found, Some(Coordinates::new(48.8443, 2.3744)));
}

#[tokio::test]
async fn test_nominatim_empty_result_is_none() {
    let geocoder = nominatim().await;
    assert_eq!(geocoder.geocode("Atlantide").await.unwrap(), None);
}

#[tokio::test]
async fn test_nominatim_error_classes() {
    let geocoder = nominatim().await;

    assert!(matches!(
        geocoder.geocode("slow").await,
        Err(GeocodeError::Timeout)
    ));
    assert!(matches!(
        geocoder.geocode("broken").await,
        Err(GeocodeError::Http(status)) if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
    ));
    assert!(matches!(
        geocoder.geocode("garbled").await,
        Err(GeocodeError::Decode(_))
    ));
}

#[tokio::test]
async fn test_double_timeout_is_unresolvable() {
    let geocoder = Arc::new(nominatim().await);
    let cache_store = Arc::new(railradar::store::MemoryStore::default());
    let cache = GeocodeCache::new(cache_store.clone(), geocoder).with_retry_delay(Duration::ZERO);

    let resolution = cache.resolve("slow").await;
    assert_eq!(resolution.source, Source::Failed);
    assert!(cache_store.entries().await.unwrap().is_empty());
}

/// In-memory spreadsheet: one entry per worksheet, keyed by title.
#[derive(Default)]
struct FakeSheet {
    ranges: Mutex<HashMap<String, Vec<Vec<String>>>>,
    auth: Mutex<Vec<String>>,
    added_sheets: Mutex<Vec<String>>,
}

impl FakeSheet {
    /// A spreadsheet whose worksheets exist but hold no rows.
    async fn with_empty_tabs(titles: &[&str]) -> Arc<Self> {
        let sheet = Arc::new(Self::default());
        for title in titles {
            sheet.ranges.lock().await.insert(title.to_string(), Vec::new());
        }
        sheet
    }

    async fn rows(&self, title: &str) -> Vec<Vec<String>> {
        self.ranges.lock().await.get(title).cloned().unwrap_or_default()
    }
}

async fn record_auth(sheet: &FakeSheet, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    sheet.auth.lock().await.push(auth);
}

fn unknown_range(range: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": {"code": 400, "message": format!("Unable to parse range: {range}")}})),
    )
        .into_response()
}

async fn spreadsheet(
    State(sheet): State<Arc<FakeSheet>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    assert_eq!(id, "sheet-123");
    assert_eq!(
        params.get("fields").map(String::as_str),
        Some("sheets.properties.title")
    );
    record_auth(&sheet, &headers).await;
    let titles: Vec<Value> = sheet
        .ranges
        .lock()
        .await
        .keys()
        .map(|title| json!({"properties": {"title": title}}))
        .collect();
    Json(json!({"sheets": titles}))
}

async fn batch_update(
    State(sheet): State<Arc<FakeSheet>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(id, "sheet-123:batchUpdate");
    record_auth(&sheet, &headers).await;
    let title = body["requests"][0]["addSheet"]["properties"]["title"]
        .as_str()
        .expect("addSheet title")
        .to_string();
    sheet.added_sheets.lock().await.push(title.clone());
    sheet.ranges.lock().await.insert(title, Vec::new());
    Json(json!({"spreadsheetId": "sheet-123", "replies": [{}]}))
}

async fn get_values(
    State(sheet): State<Arc<FakeSheet>>,
    Path((id, range)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    assert_eq!(id, "sheet-123");
    record_auth(&sheet, &headers).await;
    let ranges = sheet.ranges.lock().await;
    match ranges.get(&range) {
        None => unknown_range(&range),
        Some(rows) if rows.is_empty() => {
            Json(json!({"range": range, "majorDimension": "ROWS"})).into_response()
        }
        Some(rows) => {
            Json(json!({"range": range, "majorDimension": "ROWS", "values": rows})).into_response()
        }
    }
}

async fn append_values(
    State(sheet): State<Arc<FakeSheet>>,
    Path((id, range)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    assert_eq!(id, "sheet-123");
    assert_eq!(params.get("valueInputOption").map(String::as_str), Some("RAW"));
    record_auth(&sheet, &headers).await;

    let range = range.strip_suffix(":append").expect("append suffix").to_string();
    let rows: Vec<Vec<String>> = serde_json::from_value(body["values"].clone()).expect("values");
    let mut ranges = sheet.ranges.lock().await;
    match ranges.get_mut(&range) {
        Some(existing) => {
            existing.extend(rows);
            Json(json!({"updates": {"updatedRows": 1}})).into_response()
        }
        None => unknown_range(&range),
    }
}

async fn sheets_store(sheet: Arc<FakeSheet>) -> SheetsStore<ApiKey<BasicClient>> {
    let app = Router::new()
        .route("/{id}", get(spreadsheet).post(batch_update))
        .route("/{id}/values/{range}", get(get_values).post(append_values))
        .with_state(sheet);
    let addr = spawn(app).await;

    let client = ApiKey::bearer(client(Duration::from_secs(5)), "secret-token").unwrap();
    SheetsStore::new(client, "sheet-123", "Sheet1", "cache_geoloc")
        .with_base_url(&format!("http://{addr}"))
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn report(station: &str, incident_type: IncidentType) -> Report {
    Report {
        timestamp: "2024-03-01 08:15:00".into(),
        station: station.into(),
        line: Some("RER B".into()),
        incident_type,
        comment: "train supprimé".into(),
    }
}

#[tokio::test]
async fn test_sheets_report_log_appends_and_reads_back() {
    let sheet = Arc::new(FakeSheet::default());
    sheet
        .ranges
        .lock()
        .await
        .insert("Sheet1".into(), vec![strings(&REPORT_HEADERS)]);
    let store = sheets_store(sheet.clone()).await;

    let report = report("Gare du Nord", IncidentType::Cancellation);
    ReportLog::append(&store, &report).await.unwrap();

    let rows = store.all().await.unwrap();
    assert_eq!(rows, vec![report]);
    assert_eq!(sheet.rows("Sheet1").await.len(), 2);

    let auth = sheet.auth.lock().await;
    assert!(!auth.is_empty());
    assert!(auth.iter().all(|a| a == "Bearer secret-token"));
}

#[tokio::test]
async fn test_sheets_first_append_to_empty_tab_writes_header() {
    let sheet = FakeSheet::with_empty_tabs(&["Sheet1", "cache_geoloc"]).await;
    let store = sheets_store(sheet.clone()).await;

    let first = report("Gare du Nord", IncidentType::Cancellation);
    let second = report("Nation", IncidentType::Delay);
    ReportLog::append(&store, &first).await.unwrap();
    ReportLog::append(&store, &second).await.unwrap();

    assert_eq!(store.all().await.unwrap(), vec![first, second]);
    let raw = sheet.rows("Sheet1").await;
    assert_eq!(raw.len(), 3);
    assert_eq!(raw[0], strings(&REPORT_HEADERS));

    CacheStore::append(&store, CacheRow::new("Nation", 48.8483, 2.3959))
        .await
        .unwrap();
    assert_eq!(
        store.entries().await.unwrap(),
        vec![CacheRow::new("Nation", 48.8483, 2.3959)]
    );
    assert_eq!(sheet.rows("cache_geoloc").await[0], strings(&CACHE_HEADERS));
}

#[tokio::test]
async fn test_sheets_cached_name_is_not_geocoded_twice_from_empty_tab() {
    let sheet = FakeSheet::with_empty_tabs(&["Sheet1", "cache_geoloc"]).await;
    let store = Arc::new(sheets_store(sheet.clone()).await);
    let cache = GeocodeCache::new(store, Arc::new(nominatim().await))
        .with_retry_delay(Duration::ZERO);

    assert_eq!(cache.resolve("Gare de Lyon, Paris").await.source, Source::Remote);
    assert_eq!(cache.resolve("Gare de Lyon, Paris").await.source, Source::Cache);
    assert_eq!(sheet.rows("cache_geoloc").await.len(), 2);
}

#[tokio::test]
async fn test_sheets_reads_log_with_french_headers() {
    let sheet = Arc::new(FakeSheet::default());
    sheet.ranges.lock().await.insert(
        "Sheet1".into(),
        vec![
            strings(&["date", "lieu", "type_incident", "commentaire"]),
            strings(&["2024-03-01 08:15:00", "Nation", "Retard", "bondé"]),
        ],
    );
    let store = sheets_store(sheet).await;

    let rows = store.all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, "2024-03-01 08:15:00");
    assert_eq!(rows[0].station, "Nation");
    assert_eq!(rows[0].line, None);
    assert_eq!(rows[0].incident_type, IncidentType::Delay);
    assert_eq!(rows[0].comment, "bondé");
}

#[tokio::test]
async fn test_sheets_empty_range_reads_as_empty() {
    let store = sheets_store(FakeSheet::with_empty_tabs(&["Sheet1", "cache_geoloc"]).await).await;
    assert!(store.all().await.unwrap().is_empty());
    assert!(store.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ensure_cache_sheet_creates_missing_tab() {
    let sheet = FakeSheet::with_empty_tabs(&["Sheet1"]).await;
    let store = sheets_store(sheet.clone()).await;
    assert!(store.entries().await.is_err());

    store.ensure_cache_sheet().await.unwrap();
    store.ensure_cache_sheet().await.unwrap();

    assert_eq!(*sheet.added_sheets.lock().await, vec!["cache_geoloc".to_string()]);
    assert_eq!(sheet.rows("cache_geoloc").await, vec![strings(&CACHE_HEADERS)]);

    CacheStore::append(&store, CacheRow::new("Bastille", 48.8532, 2.3692))
        .await
        .unwrap();
    assert_eq!(
        store.entries().await.unwrap(),
        vec![CacheRow::new("Bastille", 48.8532, 2.3692)]
    );
    assert_eq!(sheet.rows("cache_geoloc").await.len(), 2);
}

#[tokio::test]
async fn test_ensure_cache_sheet_keeps_existing_tab() {
    let sheet = Arc::new(FakeSheet::default());
    sheet.ranges.lock().await.insert(
        "cache_geoloc".into(),
        vec![
            strings(&CACHE_HEADERS),
            strings(&["Nation", "48.8483", "2.3959"]),
        ],
    );
    let store = sheets_store(sheet.clone()).await;

    store.ensure_cache_sheet().await.unwrap();

    assert!(sheet.added_sheets.lock().await.is_empty());
    assert_eq!(store.entries().await.unwrap().len(), 1);
}
