use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheRow, CacheStore, ReportLog};
use crate::report::Report;

/// Process-local store; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    reports: Mutex<Vec<Report>>,
    cache: Mutex<Vec<CacheRow>>,
}

impl MemoryStore {
    /// A store pre-filled with cache rows.
    pub fn with_cache(rows: Vec<CacheRow>) -> Self {
        Self {
            reports: Mutex::default(),
            cache: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl ReportLog for MemoryStore {
    async fn append(&self, report: &Report) -> Result<()> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Report>> {
        Ok(self.reports.lock().await.clone())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn entries(&self) -> Result<Vec<CacheRow>> {
        Ok(self.cache.lock().await.clone())
    }

    async fn append(&self, row: CacheRow) -> Result<()> {
        self.cache.lock().await.push(row);
        Ok(())
    }
}
