//! CSV-file backend.
//!
//! One file per collection inside a data directory. Files are created with a
//! header row on first append and only ever opened in append mode after that.
//! File I/O runs on the blocking pool; appends are serialized so two first
//! writes cannot both emit a header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheRow, CacheStore, ReportLog};
use crate::report::Report;

const REPORTS_FILE: &str = "reports.csv";
const CACHE_FILE: &str = "cache_geoloc.csv";

pub struct CsvStore {
    reports_path: PathBuf,
    cache_path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvStore {
    /// Uses `dir` for both files, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        Ok(Self {
            reports_path: dir.join(REPORTS_FILE),
            cache_path: dir.join(CACHE_FILE),
            write_lock: Mutex::new(()),
        })
    }

    async fn append_blocking<T>(&self, path: &Path, record: T) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = path.to_path_buf();
        blocking(move || append_record(&path, &record)).await
    }

    async fn read_blocking<T>(&self, path: &Path) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.to_path_buf();
        blocking(move || read_records(&path)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("CSV I/O task did not complete")?
}

/// Appends `record` as a row, writing headers only when the file is new.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Reads every row of `path`; a missing file is an empty collection.
///
/// Rows that fail to deserialize are skipped with a warning.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);

    let mut rows = Vec::new();
    for (index, result) in rdr.deserialize().enumerate() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => warn!(path = %path.display(), row = index + 1, error = %e, "Skipping unreadable CSV row"),
        }
    }

    Ok(rows)
}

#[async_trait]
impl ReportLog for CsvStore {
    async fn append(&self, report: &Report) -> Result<()> {
        self.append_blocking(&self.reports_path, report.clone()).await
    }

    async fn all(&self) -> Result<Vec<Report>> {
        self.read_blocking(&self.reports_path).await
    }
}

#[async_trait]
impl CacheStore for CsvStore {
    async fn entries(&self) -> Result<Vec<CacheRow>> {
        self.read_blocking(&self.cache_path).await
    }

    async fn append(&self, row: CacheRow) -> Result<()> {
        self.append_blocking(&self.cache_path, row).await
    }
}
