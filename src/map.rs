//! Builds the marker set shown on the incident map.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::geo::Coordinates;
use crate::geocode::{GeocodeCache, Resolution};
use crate::report::{IncidentType, Report};
use crate::stations::{Station, StationSet};
use crate::store::ReportLog;

/// Default map centre (Paris).
pub const MAP_CENTER: Coordinates = Coordinates {
    lat: 48.8566,
    lon: 2.3522,
};
pub const MAP_ZOOM: u8 = 11;

const OSM_TILES: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const OSM_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";
const MAPBOX_ATTRIBUTION: &str = "Mapbox";

#[derive(Debug, Clone, Serialize)]
pub struct TileLayer {
    pub url: String,
    pub attribution: String,
}

impl TileLayer {
    /// Mapbox streets when a token is available, OpenStreetMap otherwise.
    pub fn for_token(mapbox_token: Option<&str>) -> Self {
        match mapbox_token.filter(|t| !t.is_empty()) {
            Some(token) => Self {
                url: format!(
                    "https://api.mapbox.com/styles/v1/mapbox/streets-v11/tiles/{{z}}/{{x}}/{{y}}?access_token={token}"
                ),
                attribution: MAPBOX_ATTRIBUTION.to_string(),
            },
            None => Self {
                url: OSM_TILES.to_string(),
                attribution: OSM_ATTRIBUTION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearestStation {
    pub name: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub coordinates: Coordinates,
    pub place: String,
    pub incident_type: IncidentType,
    pub comment: String,
    pub timestamp: String,
    pub nearest_station: Option<NearestStation>,
}

/// Everything the map page needs.
#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub center: Coordinates,
    pub zoom: u8,
    pub tiles: TileLayer,
    pub markers: Vec<Marker>,
    /// Reports that could not be placed; informational only.
    pub dropped: usize,
    pub warnings: Vec<String>,
    pub lines: Option<Value>,
    pub stations: Vec<Station>,
}

/// Reads the log and geocodes each distinct place once, against a single
/// read of the geocode cache.
///
/// Reports whose place cannot be resolved are left off the map.
#[tracing::instrument(skip_all)]
pub async fn build_map(
    log: &dyn ReportLog,
    geocoder: &GeocodeCache,
    stations: &StationSet,
    tiles: TileLayer,
    lines: Option<Value>,
) -> Result<MapView> {
    let reports = log.all().await?;
    let mut snapshot = geocoder.snapshot().await;

    let mut resolved: HashMap<String, Resolution> = HashMap::new();
    let mut warnings = Vec::new();
    let mut markers = Vec::with_capacity(reports.len());
    let mut dropped = 0usize;

    for report in &reports {
        let Some(place) = report.place_name() else {
            dropped += 1;
            continue;
        };

        if !resolved.contains_key(place) {
            let resolution = geocoder.resolve_in(place, &mut snapshot).await;
            if let Some(warning) = &resolution.warning {
                warnings.push(warning.clone());
            }
            resolved.insert(place.to_string(), resolution);
        }

        match resolved.get(place).and_then(|r| r.coordinates) {
            Some(coordinates) => markers.push(marker(report, place, coordinates, stations)),
            None => {
                debug!(place, "Report dropped from map");
                dropped += 1;
            }
        }
    }

    info!(
        reports = reports.len(),
        markers = markers.len(),
        dropped,
        places = resolved.len(),
        "Map built"
    );

    Ok(MapView {
        center: MAP_CENTER,
        zoom: MAP_ZOOM,
        tiles,
        markers,
        dropped,
        warnings,
        lines,
        stations: stations.iter().cloned().collect(),
    })
}

fn marker(report: &Report, place: &str, coordinates: Coordinates, stations: &StationSet) -> Marker {
    let nearest_station = stations
        .nearest(&coordinates)
        .map(|(station, distance_m)| NearestStation {
            name: station.name.clone(),
            distance_m,
        });

    Marker {
        coordinates,
        place: place.to_string(),
        incident_type: report.incident_type,
        comment: report.comment.clone(),
        timestamp: report.timestamp.clone(),
        nearest_station,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{GeocodeError, Geocoder};
    use crate::stations::StationMode;
    use crate::store::{CacheRow, CacheStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Knows exactly one place and counts lookups.
    struct OnePlace {
        name: &'static str,
        at: Coordinates,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for OnePlace {
        async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((query == self.name).then_some(self.at))
        }
    }

    fn report(station: &str, incident_type: IncidentType) -> Report {
        Report {
            timestamp: "2024-03-01 08:15:00".into(),
            station: station.into(),
            line: None,
            incident_type,
            comment: String::new(),
        }
    }

    async fn log_of(reports: &[Report]) -> MemoryStore {
        let store = MemoryStore::default();
        for r in reports {
            ReportLog::append(&store, r).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_unresolvable_reports_are_dropped() {
        let log = log_of(&[
            report("Gare de Lyon", IncidentType::Delay),
            report("Atlantide", IncidentType::Strike),
            report("Gare de Lyon", IncidentType::Works),
        ])
        .await;
        let geocoder = Arc::new(OnePlace {
            name: "Gare de Lyon",
            at: Coordinates::new(48.8448, 2.3735),
            calls: AtomicUsize::new(0),
        });
        let cache = GeocodeCache::new(Arc::new(MemoryStore::default()), geocoder.clone());

        let view = build_map(
            &log,
            &cache,
            &StationSet::default(),
            TileLayer::for_token(None),
            None,
        )
        .await
        .unwrap();

        assert_eq!(view.markers.len(), 2);
        assert_eq!(view.dropped, 1);
        assert!(view.warnings.is_empty());
        assert_eq!(view.markers[0].incident_type, IncidentType::Delay);
        assert_eq!(view.markers[1].incident_type, IncidentType::Works);
        // One lookup per distinct place.
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_cache_surfaces_warning() {
        let log = log_of(&[report("Nation", IncidentType::Closure)]).await;
        let cache_store = Arc::new(MemoryStore::with_cache(vec![CacheRow {
            name: "Nation".into(),
            lat: "".into(),
            lon: "2.39".into(),
        }]));
        let geocoder = Arc::new(OnePlace {
            name: "Nation",
            at: Coordinates::new(48.8483, 2.3959),
            calls: AtomicUsize::new(0),
        });
        let cache = GeocodeCache::new(cache_store, geocoder);

        let view = build_map(
            &log,
            &cache,
            &StationSet::default(),
            TileLayer::for_token(None),
            None,
        )
        .await
        .unwrap();

        assert!(view.markers.is_empty());
        assert_eq!(view.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_marker_carries_nearest_station() {
        let at = Coordinates::new(48.8448, 2.3735);
        let log = log_of(&[report("Gare de Lyon", IncidentType::Delay)]).await;
        let stations = StationSet::new(vec![Station {
            name: "Gare de Lyon".into(),
            mode: StationMode::Rer,
            lines: vec!["A".into(), "D".into()],
            coordinates: at,
        }]);
        let cache = GeocodeCache::new(
            Arc::new(MemoryStore::default()),
            Arc::new(OnePlace {
                name: "Gare de Lyon",
                at,
                calls: AtomicUsize::new(0),
            }),
        );

        let view = build_map(&log, &cache, &stations, TileLayer::for_token(Some("tok")), None)
            .await
            .unwrap();

        let nearest = view.markers[0].nearest_station.as_ref().unwrap();
        assert_eq!(nearest.name, "Gare de Lyon");
        assert_eq!(nearest.distance_m, 0.0);
        assert!(view.tiles.url.ends_with("access_token=tok"));
        assert_eq!(view.stations.len(), 1);
    }

    /// Cache store that counts full reads.
    #[derive(Default)]
    struct CountingCache {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for CountingCache {
        async fn entries(&self) -> anyhow::Result<Vec<CacheRow>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.entries().await
        }

        async fn append(&self, row: CacheRow) -> anyhow::Result<()> {
            CacheStore::append(&self.inner, row).await
        }
    }

    #[tokio::test]
    async fn test_cache_is_read_once_per_render() {
        let log = log_of(&[
            report("Gare de Lyon", IncidentType::Delay),
            report("Nation", IncidentType::Strike),
            report("Bastille", IncidentType::Works),
            report("Gare de Lyon", IncidentType::Other),
        ])
        .await;
        let cache_store = Arc::new(CountingCache::default());
        let cache = GeocodeCache::new(
            cache_store.clone(),
            Arc::new(OnePlace {
                name: "Gare de Lyon",
                at: Coordinates::new(48.8448, 2.3735),
                calls: AtomicUsize::new(0),
            }),
        );

        let view = build_map(&log, &cache, &StationSet::default(), TileLayer::for_token(None), None)
            .await
            .unwrap();

        assert_eq!(view.markers.len(), 2);
        assert_eq!(cache_store.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tiles_fall_back_to_osm() {
        assert_eq!(TileLayer::for_token(None).url, OSM_TILES);
        assert_eq!(TileLayer::for_token(Some("")).url, OSM_TILES);
    }
}
