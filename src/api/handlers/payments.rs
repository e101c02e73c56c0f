use axum::extract::{Extension, Query};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{error::PortalError, state::PortalState},
    report::{
        payments::{confirm_payment, PaymentConfirmation, PaymentError},
        DeviceReport, ReportStatus,
    },
    wizard::fields::{FieldError, FieldErrors},
};

#[derive(Deserialize, IntoParams)]
pub struct PaymentCallback {
    /// Transaction reference issued with the public report.
    pub reference: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentVerified {
    pub reference: String,
    pub report_id: uuid::Uuid,
    pub status: ReportStatus,
    /// False when an earlier callback already confirmed this payment.
    pub newly_confirmed: bool,
}

impl PaymentVerified {
    fn new(report: &DeviceReport, newly_confirmed: bool) -> Self {
        Self {
            reference: report.transaction_ref.clone(),
            report_id: report.id,
            status: report.status,
            newly_confirmed,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/payments/verify",
    params(PaymentCallback),
    responses(
        (status = 200, description = "Payment confirmed; the report awaits review.", body = PaymentVerified),
        (status = 402, description = "Payment was not completed."),
        (status = 404, description = "Unknown reference."),
        (status = 422, description = "Missing reference."),
        (status = 502, description = "The gateway could not be reached."),
        (status = 503, description = "Public reporting is unavailable."),
    ),
    tag = "public"
)]
/// Gateway callback. Safe to repeat: only the first confirmation moves the report.
pub async fn verify_payment(
    state: Extension<Arc<PortalState>>,
    Query(callback): Query<PaymentCallback>,
) -> Result<Json<PaymentVerified>, PortalError> {
    let gateway = state.payments().ok_or(PortalError::PaymentsDisabled)?;
    let reference = callback
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .ok_or_else(|| {
            PortalError::Validation(FieldErrors::single(
                "reference",
                FieldError::Required("A payment reference is required."),
            ))
        })?;

    match confirm_payment(state.reports(), gateway, state.sender(), reference).await {
        Ok(PaymentConfirmation::Confirmed(report)) => Ok(Json(PaymentVerified::new(&report, true))),
        Ok(PaymentConfirmation::AlreadyConfirmed(report)) => {
            Ok(Json(PaymentVerified::new(&report, false)))
        }
        Ok(PaymentConfirmation::NotPaid(_)) => Err(PortalError::PaymentNotCompleted),
        Ok(PaymentConfirmation::UnknownReference) => Err(PortalError::NotFound),
        Err(PaymentError::Storage(err)) => Err(PortalError::Persistence(err)),
        Err(err) => {
            error!(reference, "payment verification failed: {err}");
            Err(PortalError::PaymentUnverified)
        }
    }
}
