//! Station-scoped dashboard, report listing and review.

use axum::{
    extract::{Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    api::{error::PortalError, session::BrowserSession, state::PortalState},
    auth::Station,
    report::{
        review::{apply_review, ReviewAction},
        DeviceReport, StationSummary,
    },
};

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub station: Station,
    pub summary: StationSummary,
}

#[derive(Deserialize, IntoParams)]
pub struct ReportSearch {
    /// Substring of the IMEI.
    pub search: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub action: ReviewAction,
}

/// The signed-in officer's station.
async fn officer_station(
    state: &PortalState,
    headers: &HeaderMap,
) -> Result<Station, PortalError> {
    let session = BrowserSession::load(state, headers).await?;
    session
        .require_officer(state)
        .await?
        .station
        .ok_or(PortalError::NoStation)
}

/// Report `id` if it belongs to `station`. Other stations' reports are
/// indistinguishable from missing ones.
async fn station_report(
    state: &PortalState,
    station: &Station,
    id: Uuid,
) -> Result<DeviceReport, PortalError> {
    state
        .reports()
        .find_by_id(id)
        .await?
        .filter(|report| report.station_id == station.id)
        .ok_or(PortalError::NotFound)
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or(now, |start| start.and_utc())
}

#[utoipa::path(
    get,
    path = "/v1/dashboard",
    responses(
        (status = 200, description = "Station counts.", body = DashboardResponse),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Officer is not attached to a station."),
    ),
    tag = "reports"
)]
pub async fn dashboard(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
) -> Result<Json<DashboardResponse>, PortalError> {
    let station = officer_station(&state, &headers).await?;
    let summary = state
        .reports()
        .station_summary(station.id, month_start(Utc::now()))
        .await?;
    Ok(Json(DashboardResponse { station, summary }))
}

#[utoipa::path(
    get,
    path = "/v1/reports",
    params(ReportSearch),
    responses(
        (status = 200, description = "Station reports, newest first.", body = [DeviceReport]),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Officer is not attached to a station."),
    ),
    tag = "reports"
)]
pub async fn list_reports(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Query(query): Query<ReportSearch>,
) -> Result<Json<Vec<DeviceReport>>, PortalError> {
    let station = officer_station(&state, &headers).await?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty());
    Ok(Json(
        state.reports().list_for_station(station.id, search).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/v1/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report detail.", body = DeviceReport),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Not found"),
    ),
    tag = "reports"
)]
pub async fn report_detail(
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
) -> Result<Json<DeviceReport>, PortalError> {
    let station = officer_station(&state, &headers).await?;
    Ok(Json(station_report(&state, &station, id).await?))
}

#[utoipa::path(
    post,
    path = "/v1/reports/{id}/review",
    params(("id" = Uuid, Path, description = "Report id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Updated report.", body = DeviceReport),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Not found"),
    ),
    tag = "reports"
)]
/// Applies a review action and notifies the owner when an email is on file.
pub async fn review_report(
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<DeviceReport>, PortalError> {
    let station = officer_station(&state, &headers).await?;
    let report = station_report(&state, &station, id).await?;
    let updated = apply_review(state.reports(), state.sender(), &report, request.action).await?;
    Ok(Json(updated))
}
