//! HTTP surface: the report form, the map and a few JSON endpoints.

mod handlers;
mod pages;

use anyhow::Result;
use axum::{
    Router,
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::geocode::GeocodeCache;
use crate::map::TileLayer;
use crate::stations::StationSet;
use crate::store::ReportLog;

/// Shared, read-mostly state handed to every handler.
pub struct AppState {
    pub log: Arc<dyn ReportLog>,
    pub geocoder: GeocodeCache,
    pub stations: StationSet,
    pub lines: Option<Value>,
    pub tiles: TileLayer,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/signaler",
            get(handlers::report_form).post(handlers::submit_report),
        )
        .route("/carte", get(handlers::map_page))
        .route("/api/reports", get(handlers::list_reports))
        .route("/api/markers", get(handlers::markers))
        .route("/api/stations/nearest", get(handlers::nearest_station))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let address = listener.local_addr()?;
    info!(%address, "Server running");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
