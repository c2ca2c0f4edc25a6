use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::Geocoder;
use crate::geo::Coordinates;
use crate::store::{CacheRow, CacheStore};

/// Fixed pause before the single retry that follows a geocoder timeout.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Remote,
    /// The cache holds a value for the name but it is not a coordinate.
    Malformed,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub coordinates: Option<Coordinates>,
    pub source: Source,
    /// Message meant for the person looking at the map.
    pub warning: Option<String>,
}

impl Resolution {
    fn unresolved(source: Source) -> Self {
        Self {
            coordinates: None,
            source,
            warning: None,
        }
    }
}

/// Cache key for a place name: surrounding whitespace is ignored, case is not.
pub fn normalize_key(name: &str) -> &str {
    name.trim()
}

fn parse_row(row: &CacheRow) -> Option<Coordinates> {
    let lat = row.lat.trim().parse::<f64>().ok()?;
    let lon = row.lon.trim().parse::<f64>().ok()?;
    Coordinates::checked(lat, lon)
}

/// Cache rows read once, keyed by normalized name; the last row for a name wins.
///
/// Lets a batch of lookups (one map render) share a single store read. Names
/// geocoded during the batch are added so later lookups hit them.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    rows: HashMap<String, CacheRow>,
}

impl CacheSnapshot {
    pub fn from_rows(rows: Vec<CacheRow>) -> Self {
        let mut snapshot = Self::default();
        for row in rows {
            snapshot.insert(row);
        }
        snapshot
    }

    pub fn get(&self, name: &str) -> Option<&CacheRow> {
        self.rows.get(normalize_key(name))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn insert(&mut self, row: CacheRow) {
        self.rows.insert(normalize_key(&row.name).to_string(), row);
    }
}

/// Geocoding front-end: cache first, then the external service.
///
/// [`resolve`](Self::resolve) re-reads the cache on every call;
/// [`resolve_in`](Self::resolve_in) works against a [`CacheSnapshot`].
/// Concurrent misses for the same name may each append a row.
pub struct GeocodeCache {
    store: Arc<dyn CacheStore>,
    geocoder: Arc<dyn Geocoder>,
    retry_delay: Duration,
}

impl GeocodeCache {
    pub fn new(store: Arc<dyn CacheStore>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            store,
            geocoder,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Coordinates for `name`, or `None` when it cannot be resolved.
    pub async fn geocode(&self, name: &str) -> Option<Coordinates> {
        self.resolve(name).await.coordinates
    }

    /// Resolves `name` and reports which path produced the answer.
    ///
    /// Never fails: store and service errors are logged and the name is
    /// treated as unresolvable.
    pub async fn resolve(&self, name: &str) -> Resolution {
        let mut snapshot = self.snapshot().await;
        self.resolve_in(name, &mut snapshot).await
    }

    /// Reads the whole cache once. An unreadable store is an empty snapshot.
    pub async fn snapshot(&self) -> CacheSnapshot {
        match self.store.entries().await {
            Ok(rows) => CacheSnapshot::from_rows(rows),
            Err(e) => {
                warn!(error = %e, "Geocode cache unreadable, treating as a miss");
                CacheSnapshot::default()
            }
        }
    }

    /// Like [`resolve`](Self::resolve), but consults `snapshot` instead of
    /// the store and records fresh results in it.
    #[tracing::instrument(skip(self, snapshot))]
    pub async fn resolve_in(&self, name: &str, snapshot: &mut CacheSnapshot) -> Resolution {
        let key = normalize_key(name);
        if key.is_empty() {
            return Resolution::unresolved(Source::NotFound);
        }

        if let Some(row) = snapshot.get(key) {
            return match parse_row(row) {
                Some(coordinates) => {
                    debug!(lat = coordinates.lat, lon = coordinates.lon, "Geocode cache hit");
                    Resolution {
                        coordinates: Some(coordinates),
                        source: Source::Cache,
                        warning: None,
                    }
                }
                None => {
                    warn!(lat = %row.lat, lon = %row.lon, "Malformed geocode cache row");
                    Resolution {
                        coordinates: None,
                        source: Source::Malformed,
                        warning: Some(format!(
                            "Coordonnées invalides en cache pour « {key} » : lat={}, lon={}",
                            row.lat, row.lon
                        )),
                    }
                }
            };
        }

        let mut attempt = self.geocoder.geocode(key).await;
        if matches!(&attempt, Err(e) if e.is_transient()) {
            debug!(delay_ms = self.retry_delay.as_millis() as u64, "Geocoder timed out, retrying once");
            tokio::time::sleep(self.retry_delay).await;
            attempt = self.geocoder.geocode(key).await;
        }

        match attempt {
            Ok(Some(coordinates)) => {
                let row = CacheRow::new(key, coordinates.lat, coordinates.lon);
                if let Err(e) = self.store.append(row.clone()).await {
                    warn!(error = %e, "Failed to append geocode cache row");
                }
                snapshot.insert(row);
                debug!(lat = coordinates.lat, lon = coordinates.lon, "Geocoded and cached");
                Resolution {
                    coordinates: Some(coordinates),
                    source: Source::Remote,
                    warning: None,
                }
            }
            Ok(None) => {
                debug!("Place not found");
                Resolution::unresolved(Source::NotFound)
            }
            Err(e) => {
                warn!(error = %e, "Geocoding failed");
                Resolution::unresolved(Source::Failed)
            }
        }
    }
}
