//! CLI entry point for RailRadar.
//!
//! `serve` runs the reporting web app; `geocode` and `nearest` are operator
//! helpers that go through the same cache and station data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use railradar::config::Config;
use railradar::fetch::BasicClient;
use railradar::geo::Coordinates;
use railradar::geocode::{GeocodeCache, NominatimGeocoder};
use railradar::map::TileLayer;
use railradar::stations::{StationSet, load_lines};
use railradar::store::{CacheStore, open_stores};
use railradar::web::{AppState, serve};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "railradar")]
#[command(about = "Collaborative transit incident reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web app (report form and incident map)
    Serve {
        /// Address to listen on (overrides RAILRADAR_BIND)
        #[arg(short, long)]
        bind: Option<String>,

        /// Station GeoJSON (overrides STATIONS_PATH)
        #[arg(long, value_name = "GEOJSON")]
        stations: Option<PathBuf>,

        /// Line traces GeoJSON (overrides LINES_PATH)
        #[arg(long, value_name = "GEOJSON")]
        lines: Option<PathBuf>,
    },
    /// Resolve a place name through the geocode cache
    Geocode {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Find the station closest to a coordinate
    Nearest {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Station GeoJSON (overrides STATIONS_PATH)
        #[arg(long, value_name = "GEOJSON")]
        stations: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/railradar.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("railradar.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve {
            bind,
            stations,
            lines,
        } => {
            let stations = load_stations(stations.or(config.stations_path.clone()).as_deref())?;
            let lines = match lines.or(config.lines_path.clone()) {
                Some(path) => Some(load_lines(&path)?),
                None => None,
            };

            let (log, cache_store) = open_stores(&config).await?;
            let state = Arc::new(AppState {
                log,
                geocoder: geocode_cache(&config, cache_store)?,
                stations,
                lines,
                tiles: TileLayer::for_token(config.mapbox_token.as_deref()),
            });

            let address = bind.unwrap_or_else(|| config.bind.clone());
            info!(%address, "Binding");
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .with_context(|| format!("failed to bind {address}"))?;

            serve(listener, state).await?;
        }
        Commands::Geocode { name } => {
            let (_, cache_store) = open_stores(&config).await?;
            let resolution = geocode_cache(&config, cache_store)?.resolve(&name).await;
            if let Some(warning) = &resolution.warning {
                warn!("{warning}");
            }
            match resolution.coordinates {
                Some(c) => info!(name = %name, lat = c.lat, lon = c.lon, source = ?resolution.source, "Resolved"),
                None => info!(name = %name, source = ?resolution.source, "Unresolvable"),
            }
        }
        Commands::Nearest { lat, lon, stations } => {
            let point = Coordinates::checked(lat, lon)
                .with_context(|| format!("invalid coordinates {lat},{lon}"))?;
            let stations = load_stations(stations.or(config.stations_path.clone()).as_deref())?;
            match stations.nearest(&point) {
                Some((station, distance_m)) => info!(
                    station = %station.name,
                    mode = ?station.mode,
                    lines = ?station.lines,
                    distance_m = distance_m.round(),
                    "Nearest station"
                ),
                None => warn!("No stations loaded"),
            }
        }
    }

    Ok(())
}

fn load_stations(path: Option<&Path>) -> Result<StationSet> {
    match path {
        Some(path) => StationSet::load(path),
        None => {
            warn!("No station data configured; nearest-station lookups are disabled");
            Ok(StationSet::default())
        }
    }
}

/// Cache in front of Nominatim.
fn geocode_cache(config: &Config, cache_store: Arc<dyn CacheStore>) -> Result<GeocodeCache> {
    let client = BasicClient::new(&config.geocoder.user_agent, config.geocoder.timeout)?;
    let geocoder = NominatimGeocoder::new(client, &config.geocoder.url);
    Ok(GeocodeCache::new(cache_store, Arc::new(geocoder)).with_retry_delay(config.geocoder.retry_delay))
}
