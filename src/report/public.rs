//! Self-service reports filed by device owners.
//!
//! The report is stored as `Payment Pending` under a fresh `PAY-nnnnnn`
//! reference before the payment is initialised, so the gateway callback
//! always finds it (see [`super::payments::confirm_payment`]). A reference
//! already held by another open payment is redrawn.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    materializer::{attachment_info, insert_error, Fields, MaterializeError},
    payments::{generate_reference, PaymentError, PaymentGateway, PaymentRequest},
    repo::{RepoError, ReportRepository, PAYMENT_REFERENCE_KEY},
    DeviceReport, ReportStatus,
};
use crate::wizard::fields::ValidatedStep;

pub const DEFAULT_REPORT_FEE_KOBO: u64 = 100_000;
pub const SELF_REPORTED: &str = "Self-Reported";
const REFERENCE_ATTEMPTS: usize = 5;

#[derive(Clone, Debug)]
pub struct PublicReportConfig {
    fee_kobo: u64,
    callback_url: String,
}

impl PublicReportConfig {
    #[must_use]
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            fee_kobo: DEFAULT_REPORT_FEE_KOBO,
            callback_url: callback_url.into(),
        }
    }

    #[must_use]
    pub fn with_fee_kobo(mut self, fee_kobo: u64) -> Self {
        self.fee_kobo = fee_kobo;
        self
    }

    #[must_use]
    pub fn fee_kobo(&self) -> u64 {
        self.fee_kobo
    }

    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }
}

#[derive(Debug, Error)]
pub enum PublicReportError {
    #[error(transparent)]
    Record(#[from] MaterializeError),
    #[error("payment initialization failed: {0}")]
    Payment(#[from] PaymentError),
}

#[derive(Debug)]
pub struct PublicReportReceipt {
    pub report: DeviceReport,
    /// Where the owner completes the payment.
    pub authorization_url: String,
}

pub struct PublicReportService {
    repo: Arc<dyn ReportRepository>,
    gateway: Arc<dyn PaymentGateway>,
    config: PublicReportConfig,
}

impl PublicReportService {
    #[must_use]
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        gateway: Arc<dyn PaymentGateway>,
        config: PublicReportConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            config,
        }
    }

    /// Store the validated public form and start its payment.
    ///
    /// # Errors
    /// `Record` when the report cannot be stored (duplicate IMEI, unknown
    /// station, storage failure); `Payment` when the gateway refuses. A report
    /// whose payment could not be started stays `Payment Pending`.
    pub async fn submit(
        &self,
        validated: ValidatedStep,
    ) -> Result<PublicReportReceipt, PublicReportError> {
        let fields = Fields::new(&validated.fields);
        let station_id: Uuid = fields.reference("incident_state")?;
        let owner_email = fields.text("owner_email")?;
        let now = Utc::now();
        let mut report = DeviceReport {
            id: Uuid::now_v7(),
            owner_full_name: fields.text("owner_full_name")?,
            owner_phone_number: fields.text("owner_phone_number")?,
            owner_email: Some(owner_email.clone()),
            owner_address: fields.optional_text("owner_address"),
            imei: fields.text("imei")?,
            brand: fields.text("brand")?,
            model: fields.text("model")?,
            color: None,
            device_phone_number: None,
            incident_date: fields.date("incident_date")?,
            incident_time: now.time(),
            incident_type: SELF_REPORTED.to_string(),
            incident_location: fields.optional_text("incident_description"),
            ocr_verification_status: false,
            transaction_ref: generate_reference(),
            status: ReportStatus::PaymentPending,
            reported_by: None,
            station_id,
            attachments: attachment_info(&validated.attachments),
            created_at: now,
            updated_at: now,
        };

        // The unique index on open references settles races between submits.
        let mut attempt = 1;
        loop {
            match self.repo.insert_unique(&report, &validated.attachments).await {
                Ok(()) => break,
                Err(RepoError::DuplicateKey(PAYMENT_REFERENCE_KEY))
                    if attempt < REFERENCE_ATTEMPTS =>
                {
                    debug!(reference = %report.transaction_ref, attempt, "payment reference taken");
                    report.transaction_ref = generate_reference();
                    attempt += 1;
                }
                Err(err) => {
                    let err = insert_error(err);
                    if let MaterializeError::Persistence(source) = &err {
                        error!("Failed to insert public report: {source:#}");
                    }
                    return Err(err.into());
                }
            }
        }
        info!(report_id = %report.id, reference = %report.transaction_ref, "public report stored");

        let request = PaymentRequest {
            email: owner_email,
            amount_kobo: self.config.fee_kobo,
            reference: report.transaction_ref.clone(),
            callback_url: self.config.callback_url.clone(),
            imei: report.imei.clone(),
        };
        let authorization_url = self.gateway.initialize(&request).await.map_err(|err| {
            error!(reference = %request.reference, "payment initialization failed: {err}");
            err
        })?;

        Ok(PublicReportReceipt {
            report,
            authorization_url,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        test_support::{jpeg, FakeGateway, MemoryReportRepository},
        wizard::{
            fields::{validate_fields, Submission},
            forms::PUBLIC_REPORT_FIELDS,
        },
    };

    fn form(imei: &str, station: Uuid) -> ValidatedStep {
        let submission = Submission::new()
            .with_field("owner_full_name", "Bola Tinubu")
            .with_field("owner_phone_number", "08099998888")
            .with_field("owner_email", "bola@example.com")
            .with_field("imei", imei)
            .with_field("brand", "Infinix")
            .with_field("model", "Hot 30")
            .with_field("incident_date", "2024-06-02")
            .with_field("incident_description", "Snatched at Ojota bus stop")
            .with_field("incident_state", &station.to_string())
            .with_file(jpeg("owner_id_proof", 512));
        validate_fields(PUBLIC_REPORT_FIELDS, &submission).unwrap()
    }

    fn service(repo: Arc<MemoryReportRepository>) -> PublicReportService {
        PublicReportService::new(
            repo,
            Arc::new(FakeGateway::paid()),
            PublicReportConfig::new("https://safeimei.ng/v1/payments/verify"),
        )
    }

    #[tokio::test]
    async fn stores_payment_pending_report() {
        let repo = Arc::new(MemoryReportRepository::default());
        let station = Uuid::new_v4();

        let receipt = service(repo.clone())
            .submit(form("352099001761481", station))
            .await
            .unwrap();

        let report = &receipt.report;
        assert_eq!(report.status, ReportStatus::PaymentPending);
        assert_eq!(report.incident_type, SELF_REPORTED);
        assert_eq!(report.station_id, station);
        assert_eq!(report.reported_by, None);
        assert!(report.transaction_ref.starts_with("PAY-"));
        assert_eq!(
            report.incident_location.as_deref(),
            Some("Snatched at Ojota bus stop")
        );
        assert!(receipt.authorization_url.ends_with(&report.transaction_ref));
        assert_eq!(repo.attachment_count(report.id).await, 1);
    }

    #[tokio::test]
    async fn duplicate_imei_is_not_stored_twice() {
        let repo = Arc::new(MemoryReportRepository::default());
        let service = service(repo.clone());
        let station = Uuid::new_v4();

        service.submit(form("352099001761482", station)).await.unwrap();
        let second = service.submit(form("352099001761482", station)).await;

        assert!(matches!(
            second,
            Err(PublicReportError::Record(
                MaterializeError::DuplicateDeviceIdentifier
            ))
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn taken_reference_is_redrawn() {
        let repo = Arc::new(MemoryReportRepository::default());
        repo.contend_payment_references(REFERENCE_ATTEMPTS - 1).await;

        let receipt = service(repo.clone())
            .submit(form("352099001761483", Uuid::new_v4()))
            .await
            .unwrap();

        assert!(receipt.report.transaction_ref.starts_with("PAY-"));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn gives_up_when_every_reference_is_taken() {
        let repo = Arc::new(MemoryReportRepository::default());
        repo.contend_payment_references(REFERENCE_ATTEMPTS).await;

        let result = service(repo.clone())
            .submit(form("352099001761484", Uuid::new_v4()))
            .await;

        assert!(matches!(
            result,
            Err(PublicReportError::Record(MaterializeError::Persistence(_)))
        ));
        assert_eq!(repo.len().await, 0);
    }
}
