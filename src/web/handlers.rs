use axum::{
    Form, Json,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AppState, pages};
use crate::error::AppError;
use crate::geo::Coordinates;
use crate::map::{MapView, build_map};
use crate::report::{Report, ReportForm, submit};
use crate::stations::Station;

pub async fn index() -> Redirect {
    Redirect::to("/signaler")
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn report_form(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(pages::report_form(&state.stations, None))
}

/// Appends the report when the form is complete; an incomplete form just
/// re-renders without the success banner.
#[tracing::instrument(skip_all)]
pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ReportForm>,
) -> Result<Html<String>, AppError> {
    let stored = submit(state.log.as_ref(), form).await?;
    Ok(Html(pages::report_form(&state.stations, stored.as_ref())))
}

async fn current_map(state: &AppState) -> Result<MapView, AppError> {
    Ok(build_map(
        state.log.as_ref(),
        &state.geocoder,
        &state.stations,
        state.tiles.clone(),
        state.lines.clone(),
    )
    .await?)
}

pub async fn map_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let view = current_map(&state).await?;
    Ok(Html(pages::map_page(&view)?))
}

pub async fn markers(State(state): State<Arc<AppState>>) -> Result<Json<MapView>, AppError> {
    Ok(Json(current_map(&state).await?))
}

pub async fn list_reports(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Report>>, AppError> {
    Ok(Json(state.log.all().await?))
}

#[derive(Deserialize)]
pub struct NearestQuery {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct NearestResponse {
    station: Station,
    distance_m: f64,
}

pub async fn nearest_station(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearestQuery>,
) -> Result<impl IntoResponse, AppError> {
    let point = Coordinates::checked(query.lat, query.lon).ok_or_else(|| {
        AppError::BadRequest(format!("invalid coordinates {},{}", query.lat, query.lon))
    })?;

    let (station, distance_m) = state
        .stations
        .nearest(&point)
        .ok_or_else(|| AppError::NotFound("no stations loaded".to_string()))?;

    Ok(Json(NearestResponse {
        station: station.clone(),
        distance_m,
    }))
}
