//! Static station reference data and nearest-station lookup.
//!
//! Stations come from a transit open-data GeoJSON `FeatureCollection` of
//! Point features. The set is loaded once at startup and never mutated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::geo::Coordinates;

/// Transport mode a station is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationMode {
    Metro,
    Rer,
    Tram,
    Bus,
    Train,
    Other,
}

impl StationMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "metro" | "métro" => StationMode::Metro,
            "rer" => StationMode::Rer,
            "tram" | "tramway" => StationMode::Tram,
            "bus" => StationMode::Bus,
            "train" | "transilien" | "ter" => StationMode::Train,
            _ => StationMode::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub name: String,
    pub mode: StationMode,
    pub lines: Vec<String>,
    pub coordinates: Coordinates,
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Vec<Value>,
}

const NAME_KEYS: &[&str] = &["name", "nom", "nom_gares", "nom_long"];
const LINE_KEYS: &[&str] = &["ligne", "indice_lig", "res_com"];

/// The read-only station list.
#[derive(Debug, Clone, Default)]
pub struct StationSet {
    stations: Vec<Station>,
}

impl StationSet {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// Loads stations from a GeoJSON file.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stations from {}", path.display()))?;
        let set = Self::from_geojson(&content)?;
        info!(stations = set.len(), "Station reference data loaded");
        Ok(set)
    }

    /// Parses a `FeatureCollection`; non-Point or unnamed features are skipped.
    pub fn from_geojson(content: &str) -> Result<Self> {
        let collection: FeatureCollection =
            serde_json::from_str(content).context("stations document is not a FeatureCollection")?;
        if collection.kind != "FeatureCollection" {
            anyhow::bail!("stations document has type '{}', expected FeatureCollection", collection.kind);
        }

        let mut skipped = 0usize;
        let stations: Vec<Station> = collection
            .features
            .into_iter()
            .filter_map(|feature| {
                let station = station_from_feature(feature);
                if station.is_none() {
                    skipped += 1;
                }
                station
            })
            .collect();

        debug!(kept = stations.len(), skipped, "Parsed station features");
        Ok(Self { stations })
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    /// Case-insensitive exact match on the station name.
    pub fn find_by_name(&self, name: &str) -> Option<&Station> {
        let wanted = name.trim().to_lowercase();
        self.stations
            .iter()
            .find(|s| s.name.to_lowercase() == wanted)
    }

    /// The station closest to `point` and its distance in metres.
    ///
    /// On equal distances the earlier station in the set wins.
    pub fn nearest(&self, point: &Coordinates) -> Option<(&Station, f64)> {
        let mut best: Option<(&Station, f64)> = None;
        for station in &self.stations {
            let distance = point.distance_m(&station.coordinates);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((station, distance)),
            }
        }
        best
    }
}

fn station_from_feature(feature: Feature) -> Option<Station> {
    let geometry = feature.geometry?;
    if geometry.kind != "Point" || geometry.coordinates.len() < 2 {
        return None;
    }
    let lon = geometry.coordinates[0].as_f64()?;
    let lat = geometry.coordinates[1].as_f64()?;
    let coordinates = Coordinates::checked(lat, lon)?;

    let properties = feature.properties.unwrap_or_default();
    let name = NAME_KEYS
        .iter()
        .find_map(|key| properties.get(*key)?.as_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())?
        .to_string();

    let mode = properties
        .get("mode")
        .and_then(Value::as_str)
        .map(StationMode::parse)
        .unwrap_or(StationMode::Other);

    Some(Station {
        name,
        mode,
        lines: line_codes(&properties),
        coordinates,
    })
}

fn line_codes(properties: &Map<String, Value>) -> Vec<String> {
    if let Some(Value::Array(items)) = properties.get("lines") {
        return items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect();
    }

    LINE_KEYS
        .iter()
        .find_map(|key| properties.get(*key)?.as_str())
        .map(|raw| {
            raw.split([',', '/'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Loads the line-trace overlay as an opaque GeoJSON value.
pub fn load_lines(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read line traces from {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    if value.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        anyhow::bail!("{} is not a GeoJSON FeatureCollection", path.display());
    }
    Ok(value)
}
