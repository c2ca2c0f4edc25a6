//! Persistence for the report log and the geocode cache.
//!
//! Both are append-only row collections. Three backends implement the
//! traits: local CSV files, a Google Sheets spreadsheet and an in-memory
//! store used by tests and throwaway runs.

mod files;
mod memory;
mod sheets;

pub use files::CsvStore;
pub use memory::MemoryStore;
pub use sheets::SheetsStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, SheetsConfig, SheetsCredentials, StoreKind};
use crate::fetch::auth::{ApiKey, Bearer, SHEETS_SCOPE, ServiceAccount};
use crate::fetch::{BasicClient, HttpClient};
use crate::report::Report;

/// Column headers of the report log, in order.
pub const REPORT_HEADERS: [&str; 5] = ["timestamp", "station", "line", "incident_type", "comment"];

/// Column headers of the geocode cache, in order.
pub const CACHE_HEADERS: [&str; 3] = ["lieu", "lat", "lon"];

/// A raw geocode cache row.
///
/// Latitude and longitude are kept as text so a hand-edited or corrupted
/// value surfaces as malformed instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRow {
    #[serde(rename = "lieu")]
    pub name: String,
    pub lat: String,
    pub lon: String,
}

impl CacheRow {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat: lat.to_string(),
            lon: lon.to_string(),
        }
    }
}

/// Ordered, append-only log of reports.
#[async_trait]
pub trait ReportLog: Send + Sync {
    async fn append(&self, report: &Report) -> Result<()>;

    /// Every report in insertion order.
    async fn all(&self) -> Result<Vec<Report>>;
}

/// Append-only store of geocode cache rows.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn entries(&self) -> Result<Vec<CacheRow>>;

    async fn append(&self, row: CacheRow) -> Result<()>;
}

/// Opens the configured backend for both collections.
///
/// For Sheets this also creates the cache worksheet when it is missing.
pub async fn open_stores(config: &Config) -> Result<(Arc<dyn ReportLog>, Arc<dyn CacheStore>)> {
    info!(store = ?config.store, "Opening stores");
    match config.store {
        StoreKind::Memory => Ok(split(Arc::new(MemoryStore::default()))),
        StoreKind::Csv => Ok(split(Arc::new(CsvStore::open(&config.data_dir)?))),
        StoreKind::Sheets => {
            let sheets = config
                .sheets
                .as_ref()
                .context("sheets store selected without spreadsheet settings")?;
            let http = BasicClient::new("railradar", Duration::from_secs(30))?;
            match &sheets.credentials {
                SheetsCredentials::AccessToken(token) => {
                    open_sheets(ApiKey::bearer(http, token)?, sheets).await
                }
                SheetsCredentials::ServiceAccountJson(key) => {
                    let account = ServiceAccount::from_json(key, &[SHEETS_SCOPE])?;
                    open_sheets(Bearer::new(http, Arc::new(account)), sheets).await
                }
                SheetsCredentials::ServiceAccountFile(path) => {
                    let account = ServiceAccount::from_file(path, &[SHEETS_SCOPE])?;
                    open_sheets(Bearer::new(http, Arc::new(account)), sheets).await
                }
            }
        }
    }
}

async fn open_sheets<C>(
    client: C,
    sheets: &SheetsConfig,
) -> Result<(Arc<dyn ReportLog>, Arc<dyn CacheStore>)>
where
    C: HttpClient + 'static,
{
    let store = SheetsStore::new(
        client,
        &sheets.spreadsheet_id,
        &sheets.report_range,
        &sheets.cache_range,
    );
    store
        .ensure_cache_sheet()
        .await
        .context("failed to prepare the geocode cache worksheet")?;
    Ok(split(Arc::new(store)))
}

fn split<S>(store: Arc<S>) -> (Arc<dyn ReportLog>, Arc<dyn CacheStore>)
where
    S: ReportLog + CacheStore + 'static,
{
    let log: Arc<dyn ReportLog> = store.clone();
    let cache: Arc<dyn CacheStore> = store;
    (log, cache)
}
