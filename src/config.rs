//! Runtime configuration from the environment (and `.env`).

use anyhow::{Context, Result};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::geocode::DEFAULT_NOMINATIM_URL;

/// Which backend holds the report log and the geocode cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Csv,
    Sheets,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "csv" => Ok(StoreKind::Csv),
            "sheets" => Ok(StoreKind::Sheets),
            other => Err(anyhow::anyhow!(
                "unknown store '{other}', expected memory, csv or sheets"
            )),
        }
    }
}

/// How the Sheets backend authenticates.
#[derive(Clone)]
pub enum SheetsCredentials {
    /// Fixed OAuth access token; it is not refreshed.
    AccessToken(String),
    /// Service-account key JSON, inline.
    ServiceAccountJson(String),
    /// Path to a service-account key file.
    ServiceAccountFile(PathBuf),
}

impl std::fmt::Debug for SheetsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetsCredentials::AccessToken(_) => f.write_str("AccessToken(..)"),
            SheetsCredentials::ServiceAccountJson(_) => f.write_str("ServiceAccountJson(..)"),
            SheetsCredentials::ServiceAccountFile(path) => {
                f.debug_tuple("ServiceAccountFile").field(path).finish()
            }
        }
    }
}

impl SheetsCredentials {
    fn from_env() -> Result<Self> {
        if let Some(token) = optional("GOOGLE_ACCESS_TOKEN") {
            return Ok(SheetsCredentials::AccessToken(token));
        }
        if let Some(key) = optional("GOOGLE_SERVICE_ACCOUNT_JSON") {
            return Ok(SheetsCredentials::ServiceAccountJson(key));
        }
        optional("GOOGLE_APPLICATION_CREDENTIALS")
            .map(|path| SheetsCredentials::ServiceAccountFile(PathBuf::from(path)))
            .context(
                "sheets store needs GOOGLE_ACCESS_TOKEN, GOOGLE_SERVICE_ACCOUNT_JSON \
                 or GOOGLE_APPLICATION_CREDENTIALS",
            )
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub credentials: SheetsCredentials,
    pub report_range: String,
    pub cache_range: String,
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub store: StoreKind,
    pub data_dir: PathBuf,
    pub sheets: Option<SheetsConfig>,
    pub geocoder: GeocoderConfig,
    pub mapbox_token: Option<String>,
    pub stations_path: Option<PathBuf>,
    pub lines_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store: StoreKind = try_load("RAILRADAR_STORE", "csv")?;

        let sheets = if store == StoreKind::Sheets {
            Some(SheetsConfig {
                spreadsheet_id: required("SPREADSHEET_ID")?,
                credentials: SheetsCredentials::from_env()?,
                report_range: try_load("SHEETS_REPORT_RANGE", "Sheet1")?,
                cache_range: try_load("SHEETS_CACHE_RANGE", "cache_geoloc")?,
            })
        } else {
            None
        };

        Ok(Self {
            bind: try_load("RAILRADAR_BIND", "0.0.0.0:8501")?,
            store,
            data_dir: try_load("RAILRADAR_DATA_DIR", "data")?,
            sheets,
            geocoder: GeocoderConfig {
                url: try_load("GEOCODER_URL", DEFAULT_NOMINATIM_URL)?,
                user_agent: try_load("GEOCODER_USER_AGENT", "railradar")?,
                timeout: Duration::from_secs(try_load("GEOCODER_TIMEOUT_SECS", "10")?),
                retry_delay: Duration::from_millis(try_load("GEOCODER_RETRY_DELAY_MS", "1000")?),
            },
            mapbox_token: optional("MAPBOX_TOKEN"),
            stations_path: optional("STATIONS_PATH").map(PathBuf::from),
            lines_path: optional("LINES_PATH").map(PathBuf::from),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        debug!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} value '{raw}': {e}"))
}
