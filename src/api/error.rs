//! Client-facing error taxonomy for the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::{
    auth::otp::ChallengeError,
    report::{materializer::MaterializeError, payments::PaymentError, public::PublicReportError},
    wizard::fields::FieldErrors,
};

pub(crate) const DUPLICATE_IMEI_MESSAGE: &str = "This IMEI has already been reported.";
pub(crate) const UNKNOWN_STATION_MESSAGE: &str = "Select a valid state command.";

#[derive(Debug)]
pub enum PortalError {
    Validation(FieldErrors),
    /// Request body could not be read, e.g. a broken multipart stream.
    MalformedBody(String),
    InvalidCredentials,
    NoChallengePending,
    CodeMismatch,
    Delivery,
    /// Field-level conflict, e.g. a device identifier that is already reported.
    Conflict {
        field: &'static str,
        message: &'static str,
    },
    Unauthenticated,
    NoStation,
    NotFound,
    PaymentsDisabled,
    Payment,
    PaymentUnverified,
    PaymentNotCompleted,
    LookupUnavailable,
    Persistence(anyhow::Error),
}

impl PortalError {
    pub(crate) fn duplicate_imei() -> Self {
        Self::Conflict {
            field: "imei",
            message: DUPLICATE_IMEI_MESSAGE,
        }
    }
}

impl From<anyhow::Error> for PortalError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}

impl From<ChallengeError> for PortalError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::NoDestination(_) | ChallengeError::DeliveryUnavailable => {
                Self::Delivery
            }
            ChallengeError::NoChallengePending => Self::NoChallengePending,
            ChallengeError::CodeMismatch => Self::CodeMismatch,
            ChallengeError::Lookup(err) => Self::Persistence(err),
        }
    }
}

impl From<MaterializeError> for PortalError {
    fn from(err: MaterializeError) -> Self {
        match err {
            MaterializeError::NoStation => Self::NoStation,
            MaterializeError::DuplicateDeviceIdentifier => Self::duplicate_imei(),
            MaterializeError::UnknownStation => Self::Conflict {
                field: "incident_state",
                message: UNKNOWN_STATION_MESSAGE,
            },
            MaterializeError::MissingField(field) => {
                Self::Persistence(anyhow::anyhow!("accepted input is missing `{field}`"))
            }
            MaterializeError::Persistence(err) => Self::Persistence(err),
        }
    }
}

impl From<PublicReportError> for PortalError {
    fn from(err: PublicReportError) -> Self {
        match err {
            PublicReportError::Record(err) => err.into(),
            PublicReportError::Payment(err) => err.into(),
        }
    }
}

impl From<PaymentError> for PortalError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Transport(_) | PaymentError::Rejected(_) => Self::Payment,
            PaymentError::Storage(err) => Self::Persistence(err),
        }
    }
}

fn message(message: &str) -> Value {
    json!({ "message": message })
}

/// Status and body for each variant. Internal detail is logged, never returned.
pub(crate) fn error_response(err: &PortalError) -> (StatusCode, Value) {
    match err {
        PortalError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": errors.to_messages() }),
        ),
        PortalError::MalformedBody(_) => (
            StatusCode::BAD_REQUEST,
            message("Malformed request body."),
        ),
        PortalError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            message("Invalid Station ID or Password."),
        ),
        PortalError::NoChallengePending => (
            StatusCode::UNAUTHORIZED,
            message("No verification in progress. Please log in again."),
        ),
        PortalError::CodeMismatch => (
            StatusCode::BAD_REQUEST,
            message("Invalid verification code."),
        ),
        PortalError::Delivery => (
            StatusCode::SERVICE_UNAVAILABLE,
            message("We couldn't send the verification code. Please try again later."),
        ),
        PortalError::Conflict { field, message } => {
            let errors = BTreeMap::from([(field.to_string(), vec![message.to_string()])]);
            (StatusCode::CONFLICT, json!({ "errors": errors }))
        }
        PortalError::Unauthenticated => {
            (StatusCode::UNAUTHORIZED, message("Authentication required"))
        }
        PortalError::NoStation => (
            StatusCode::FORBIDDEN,
            message("Your account is not attached to a station."),
        ),
        PortalError::NotFound => (StatusCode::NOT_FOUND, message("Not found")),
        PortalError::PaymentsDisabled => (
            StatusCode::SERVICE_UNAVAILABLE,
            message("Public reporting is currently unavailable."),
        ),
        PortalError::Payment => (
            StatusCode::BAD_GATEWAY,
            message("Payment initialization failed."),
        ),
        PortalError::PaymentUnverified => (
            StatusCode::BAD_GATEWAY,
            message("We couldn't verify the payment. Please try again later."),
        ),
        PortalError::PaymentNotCompleted => (
            StatusCode::PAYMENT_REQUIRED,
            message("Payment was not completed."),
        ),
        PortalError::LookupUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            message("We couldn't verify this IMEI at the moment. Please try again later."),
        ),
        PortalError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            message("We couldn't process your submission. Please try again later."),
        ),
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        match &self {
            Self::Persistence(err) => error!("Request failed: {err:#}"),
            Self::MalformedBody(detail) => debug!("Rejected request body: {detail}"),
            _ => {}
        }
        let (status, body) = error_response(&self);
        (status, Json(body)).into_response()
    }
}
