//! Payment for self-service reports.
//!
//! Flow Overview:
//! 1) A public report is stored as `Payment Pending` with a `PAY-nnnnnn`
//!    reference and a payment is initialised with the gateway.
//! 2) The gateway redirects the owner back with `?reference=`.
//! 3) `confirm_payment` verifies the reference and moves the report to
//!    `Pending` exactly once; repeated callbacks are no-ops.

use anyhow::Result;
use rand::{rngs::OsRng, Rng};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::{repo::ReportRepository, DeviceReport, ReportStatus};
use crate::{
    notify::{NotificationMessage, NotificationSender},
    BoxFuture, APP_USER_AGENT,
};

pub const PAYSTACK_API_URL: &str = "https://api.paystack.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway unreachable: {0}")]
    Transport(String),
    #[error("payment gateway refused request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    pub email: String,
    pub amount_kobo: u64,
    pub reference: String,
    pub callback_url: String,
    pub imei: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    /// Gateway-reported status, e.g. `abandoned` or `failed`.
    NotPaid(String),
}

pub trait PaymentGateway: Send + Sync {
    /// Start a payment and return the URL the payer must visit.
    fn initialize<'a>(&'a self, request: &'a PaymentRequest)
        -> BoxFuture<'a, Result<String, PaymentError>>;

    fn verify<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<PaymentStatus, PaymentError>>;
}

/// Random `PAY-nnnnnn` reference.
#[must_use]
pub fn generate_reference() -> String {
    let value: u32 = OsRng.gen_range(100_000..=999_999);
    format!("PAY-{value}")
}

pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: SecretString,
}

impl PaystackGateway {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: PAYSTACK_API_URL.to_string(),
            secret_key,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Value, PaymentError> {
        let response = request
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|err| PaymentError::Transport(err.to_string()))?;
        let http_status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| PaymentError::Transport(err.to_string()))?;

        if http_status.is_success() && body.get("status").and_then(Value::as_bool) == Some(true) {
            Ok(body)
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            error!("Paystack request failed ({http_status}): {message}");
            Err(PaymentError::Rejected(message))
        }
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initialize_transaction(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let body = self
            .call(self.client.post(&url).json(&initialize_payload(request)))
            .await?;
        get_str(&body, &["data", "authorization_url"])
            .map(str::to_string)
            .ok_or_else(|| PaymentError::Rejected("missing authorization_url".to_string()))
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, reference: &str) -> Result<PaymentStatus, PaymentError> {
        let url = format!("{}/transaction/verify/{reference}", self.base_url);
        let body = self.call(self.client.get(&url)).await?;
        match get_str(&body, &["data", "status"]) {
            Some("success") => Ok(PaymentStatus::Paid),
            Some(other) => Ok(PaymentStatus::NotPaid(other.to_string())),
            None => Ok(PaymentStatus::NotPaid("unknown".to_string())),
        }
    }
}

fn initialize_payload(request: &PaymentRequest) -> Value {
    json!({
        "email": request.email,
        "amount": request.amount_kobo,
        "reference": request.reference,
        "callback_url": request.callback_url,
        "metadata": {
            "custom_fields": [
                {"display_name": "IMEI", "variable_name": "imei", "value": request.imei}
            ]
        }
    })
}

fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

impl PaymentGateway for PaystackGateway {
    fn initialize<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<String, PaymentError>> {
        Box::pin(self.initialize_transaction(request))
    }

    fn verify<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<PaymentStatus, PaymentError>> {
        Box::pin(self.verify_transaction(reference))
    }
}

#[derive(Debug)]
pub enum PaymentConfirmation {
    /// This callback moved the report to pending review.
    Confirmed(DeviceReport),
    /// An earlier callback already did.
    AlreadyConfirmed(DeviceReport),
    NotPaid(String),
    UnknownReference,
}

/// Verify `reference` and advance the matching report at most once.
///
/// # Errors
/// Gateway transport failures and storage errors.
pub async fn confirm_payment(
    repo: &dyn ReportRepository,
    gateway: &dyn PaymentGateway,
    sender: &dyn NotificationSender,
    reference: &str,
) -> Result<PaymentConfirmation, PaymentError> {
    if let PaymentStatus::NotPaid(status) = gateway.verify(reference).await? {
        warn!(reference, status = %status, "payment not completed");
        return Ok(PaymentConfirmation::NotPaid(status));
    }

    let transitioned = repo
        .transition_status_by_reference(
            reference,
            ReportStatus::PaymentPending,
            ReportStatus::PendingReview,
        )
        .await?;

    if let Some(report) = transitioned {
        info!(report_id = %report.id, reference, "payment confirmed");
        send_receipt(sender, &report).await;
        return Ok(PaymentConfirmation::Confirmed(report));
    }

    match repo.find_by_transaction_ref(reference).await? {
        Some(report) if report.status != ReportStatus::PaymentPending => {
            Ok(PaymentConfirmation::AlreadyConfirmed(report))
        }
        Some(report) => Ok(PaymentConfirmation::NotPaid(report.status.to_string())),
        None => Ok(PaymentConfirmation::UnknownReference),
    }
}

async fn send_receipt(sender: &dyn NotificationSender, report: &DeviceReport) {
    let Some(email) = report.owner_email.as_deref() else {
        return;
    };
    let message = NotificationMessage::new(
        email,
        format!("SafeIMEI Report Received - {}", report.transaction_ref),
        format!(
            "Dear {},\n\nPayment received. Your report for IMEI {} is now PENDING VERIFICATION.",
            report.owner_full_name, report.imei
        ),
    );
    if let Err(err) = sender.send(&message).await {
        warn!(report_id = %report.id, "failed to send payment receipt: {err}");
    }
}
