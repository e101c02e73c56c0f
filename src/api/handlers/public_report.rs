//! Self-service report filed by a device owner, paid through the gateway.

use axum::{
    extract::{Extension, Multipart},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::read_submission;
use crate::{
    api::{
        error::{PortalError, UNKNOWN_STATION_MESSAGE},
        state::PortalState,
    },
    wizard::{
        fields::{validate_fields, FieldError, FieldErrors, FieldValue},
        forms::PUBLIC_REPORT_FIELDS,
    },
};

#[derive(Serialize, ToSchema)]
pub struct PublicReportResponse {
    pub report_id: Uuid,
    /// `PAY-nnnnnn` reference echoed back by the payment callback.
    pub reference: String,
    /// Where the owner completes the payment.
    pub authorization_url: String,
}

#[utoipa::path(
    post,
    path = "/v1/public/reports",
    request_body(content = String, content_type = "multipart/form-data", description = "Public report form; `owner_id_proof` and `device_receipt` as file parts."),
    responses(
        (status = 201, description = "Report stored as Payment Pending; continue at the authorization URL.", body = PublicReportResponse),
        (status = 409, description = "This IMEI has already been reported."),
        (status = 422, description = "Field errors."),
        (status = 502, description = "Payment initialization failed."),
        (status = 503, description = "Public reporting is unavailable."),
    ),
    tag = "public"
)]
pub async fn submit_public_report(
    state: Extension<Arc<PortalState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PublicReportResponse>), PortalError> {
    let service = state.public_reports().ok_or(PortalError::PaymentsDisabled)?;
    let submission = read_submission(multipart).await?;
    let validated =
        validate_fields(PUBLIC_REPORT_FIELDS, &submission).map_err(PortalError::Validation)?;

    if let Some(FieldValue::Reference(station_id)) = validated.fields.get("incident_state") {
        if state.directory().station(*station_id).await?.is_none() {
            return Err(PortalError::Validation(FieldErrors::single(
                "incident_state",
                FieldError::InvalidFormat(UNKNOWN_STATION_MESSAGE),
            )));
        }
    }

    let receipt = service.submit(validated).await?;
    Ok((
        StatusCode::CREATED,
        Json(PublicReportResponse {
            report_id: receipt.report.id,
            reference: receipt.report.transaction_ref,
            authorization_url: receipt.authorization_url,
        }),
    ))
}
