//! Public device lookup, sighting alerts and the station list.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::{
    api::{error::PortalError, session::extract_client_ip, state::PortalState},
    auth::Station,
    lookup::{check_device, send_alert, AlertOutcome, LookupResult},
    wizard::fields::{FieldError, FieldErrors},
};

#[derive(Deserialize, ToSchema)]
pub struct DeviceQuery {
    pub imei: String,
}

impl DeviceQuery {
    fn imei(&self) -> Result<&str, PortalError> {
        let imei = self.imei.trim();
        if imei.is_empty() {
            return Err(PortalError::Validation(FieldErrors::single(
                "imei",
                FieldError::Required("Please enter an IMEI number."),
            )));
        }
        Ok(imei)
    }
}

#[derive(Serialize, ToSchema)]
pub struct AlertAccepted {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/v1/lookup",
    request_body = DeviceQuery,
    responses(
        (status = 200, description = "Lookup verdict.", body = LookupResult),
        (status = 422, description = "Missing IMEI."),
        (status = 503, description = "The report store could not be queried."),
    ),
    tag = "public"
)]
/// Tells the caller whether a device is currently reported stolen.
pub async fn lookup(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Json(query): Json<DeviceQuery>,
) -> Result<Json<LookupResult>, PortalError> {
    let imei = query.imei()?;
    let requester = extract_client_ip(&headers);
    match check_device(state.reports(), state.geo(), imei, requester).await {
        Ok(result) => Ok(Json(result)),
        Err(err) => {
            error!("Error checking IMEI {imei}: {err:#}");
            Err(PortalError::LookupUnavailable)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/alerts",
    request_body = DeviceQuery,
    responses(
        (status = 202, description = "Alert accepted.", body = AlertAccepted),
        (status = 422, description = "Missing IMEI."),
    ),
    tag = "public"
)]
/// Anonymous sighting tip. The answer never reveals whether anyone was notified.
pub async fn alert(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Json(query): Json<DeviceQuery>,
) -> Result<(StatusCode, Json<AlertAccepted>), PortalError> {
    let imei = query.imei()?;
    let requester = extract_client_ip(&headers);
    match send_alert(
        state.reports(),
        state.directory(),
        state.sender(),
        state.geo(),
        imei,
        requester,
    )
    .await
    {
        Ok(AlertOutcome::Sent { .. }) => {}
        Ok(outcome) => info!(imei, ?outcome, "alert not delivered"),
        Err(err) => error!("Failed to send alert for IMEI {imei}: {err:#}"),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AlertAccepted {
            message: "Thank you. The responsible station has been alerted.".to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/stations",
    responses(
        (status = 200, description = "State commands, ordered by name.", body = [Station]),
    ),
    tag = "public"
)]
pub async fn stations(
    state: Extension<Arc<PortalState>>,
) -> Result<Json<Vec<Station>>, PortalError> {
    Ok(Json(state.directory().stations().await?))
}
