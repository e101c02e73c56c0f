//! Turns accepted wizard input into a stored `DeviceReport`.

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveTime, Utc};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    repo::{RepoError, ReportRepository, PAYMENT_REFERENCE_KEY},
    AttachmentInfo, DeviceReport, ReportStatus,
};
use crate::{
    auth::Principal,
    wizard::{
        fields::{FieldValue, UploadedFile},
        forms::WIZARD_ONLY_FIELDS,
    },
};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("officer is not attached to a station")]
    NoStation,
    #[error("accepted input is missing `{0}`")]
    MissingField(&'static str),
    #[error("a report for this device identifier already exists")]
    DuplicateDeviceIdentifier,
    #[error("the selected station does not exist")]
    UnknownStation,
    #[error("failed to persist report: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Typed accessors over validated field values.
pub(crate) struct Fields<'a>(&'a BTreeMap<String, FieldValue>);

impl<'a> Fields<'a> {
    pub(crate) fn new(values: &'a BTreeMap<String, FieldValue>) -> Self {
        Self(values)
    }

    pub(crate) fn text(&self, name: &'static str) -> Result<String, MaterializeError> {
        self.optional_text(name)
            .ok_or(MaterializeError::MissingField(name))
    }

    pub(crate) fn optional_text(&self, name: &str) -> Option<String> {
        self.0
            .get(name)
            .and_then(FieldValue::as_text)
            .map(str::to_string)
    }

    pub(crate) fn date(&self, name: &'static str) -> Result<NaiveDate, MaterializeError> {
        match self.0.get(name) {
            Some(FieldValue::Date(value)) => Ok(*value),
            _ => Err(MaterializeError::MissingField(name)),
        }
    }

    pub(crate) fn time(&self, name: &'static str) -> Result<NaiveTime, MaterializeError> {
        match self.0.get(name) {
            Some(FieldValue::Time(value)) => Ok(*value),
            _ => Err(MaterializeError::MissingField(name)),
        }
    }

    pub(crate) fn reference(&self, name: &'static str) -> Result<Uuid, MaterializeError> {
        match self.0.get(name) {
            Some(FieldValue::Reference(value)) => Ok(*value),
            _ => Err(MaterializeError::MissingField(name)),
        }
    }
}

pub(crate) fn attachment_info(files: &[UploadedFile]) -> Vec<AttachmentInfo> {
    files
        .iter()
        .map(|file| AttachmentInfo {
            kind: file.field.clone(),
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            size_bytes: i64::try_from(file.bytes.len()).unwrap_or(i64::MAX),
        })
        .collect()
}

/// Map a repository failure from an insert onto the materializer taxonomy.
pub(crate) fn insert_error(err: RepoError) -> MaterializeError {
    match err {
        RepoError::DuplicateKey(PAYMENT_REFERENCE_KEY) => {
            MaterializeError::Persistence(anyhow!("payment reference already in use"))
        }
        RepoError::DuplicateKey(_) => MaterializeError::DuplicateDeviceIdentifier,
        RepoError::MissingReference(_) => MaterializeError::UnknownStation,
        RepoError::Other(err) => MaterializeError::Persistence(err),
    }
}

#[derive(Clone)]
pub struct Materializer {
    repo: Arc<dyn ReportRepository>,
}

impl Materializer {
    #[must_use]
    pub fn new(repo: Arc<dyn ReportRepository>) -> Self {
        Self { repo }
    }

    /// Build the record from `values` and the acting officer, then insert it.
    ///
    /// # Errors
    /// `NoStation` for officers without a station, `DuplicateDeviceIdentifier`
    /// when the IMEI is already reported, `Persistence` for anything else.
    pub async fn materialize(
        &self,
        values: &BTreeMap<String, FieldValue>,
        attachments: Vec<UploadedFile>,
        principal: &Principal,
    ) -> Result<DeviceReport, MaterializeError> {
        let station = principal
            .station
            .as_ref()
            .ok_or(MaterializeError::NoStation)?;

        let mut persisted = values.clone();
        for field in WIZARD_ONLY_FIELDS {
            persisted.remove(*field);
        }
        let fields = Fields::new(&persisted);

        let now = Utc::now();
        let report = DeviceReport {
            id: Uuid::now_v7(),
            owner_full_name: fields.text("owner_full_name")?,
            owner_phone_number: fields.text("owner_phone_number")?,
            owner_email: fields.optional_text("owner_email"),
            owner_address: fields.optional_text("owner_address"),
            imei: fields.text("imei")?,
            brand: fields.text("brand")?,
            model: fields.text("model")?,
            color: fields.optional_text("color"),
            device_phone_number: fields.optional_text("device_phone_number"),
            incident_date: fields.date("incident_date")?,
            incident_time: fields.time("incident_time")?,
            incident_type: fields.text("incident_type")?,
            incident_location: fields.optional_text("incident_location"),
            ocr_verification_status: false,
            transaction_ref: fields.text("transaction_ref")?,
            status: ReportStatus::INITIAL,
            reported_by: Some(principal.officer_id),
            station_id: station.id,
            attachments: attachment_info(&attachments),
            created_at: now,
            updated_at: now,
        };

        match self.repo.insert_unique(&report, &attachments).await {
            Ok(()) => {
                info!(
                    report_id = %report.id,
                    officer = %principal.username,
                    station = %station.name,
                    "device report created"
                );
                Ok(report)
            }
            Err(err) => {
                let err = insert_error(err);
                if let MaterializeError::Persistence(source) = &err {
                    error!("Failed to insert device report: {source:#}");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg, officer, FailingReportRepository, MemoryReportRepository};

    fn values() -> BTreeMap<String, FieldValue> {
        let text = |v: &str| FieldValue::Text(v.to_string());
        BTreeMap::from([
            ("owner_full_name".to_string(), text("Amaka Eze")),
            ("owner_phone_number".to_string(), text("08020000000")),
            ("owner_email".to_string(), FieldValue::Blank),
            ("owner_address".to_string(), FieldValue::Blank),
            ("imei".to_string(), text("356938035643809")),
            ("brand".to_string(), text("Samsung")),
            ("model".to_string(), text("Galaxy A14")),
            ("color".to_string(), FieldValue::Blank),
            ("device_phone_number".to_string(), FieldValue::Blank),
            (
                "incident_date".to_string(),
                FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()),
            ),
            (
                "incident_time".to_string(),
                FieldValue::Time(NaiveTime::from_hms_opt(7, 5, 0).unwrap()),
            ),
            ("incident_type".to_string(), text("Robbery")),
            ("incident_location".to_string(), text("Wuse Market")),
            ("transaction_ref".to_string(), text("TRX-77")),
            ("terms".to_string(), FieldValue::Flag(true)),
        ])
    }

    #[tokio::test]
    async fn stamps_context_fields() {
        let repo = Arc::new(MemoryReportRepository::default());
        let materializer = Materializer::new(repo.clone());
        let principal = officer("FCT01");

        let report = materializer
            .materialize(&values(), vec![jpeg("police_report_image", 10)], &principal)
            .await
            .unwrap();

        assert_eq!(report.reported_by, Some(principal.officer_id));
        assert_eq!(Some(report.station_id), principal.station.map(|s| s.id));
        assert_eq!(report.status, ReportStatus::Stolen);
        assert!(!report.ocr_verification_status);
        assert_eq!(report.created_at, report.updated_at);
        assert_eq!(report.owner_email, None);
        assert_eq!(report.attachments[0].kind, "police_report_image");
        assert_eq!(repo.attachment_count(report.id).await, 1);
    }

    #[tokio::test]
    async fn station_is_required() {
        let materializer = Materializer::new(Arc::new(MemoryReportRepository::default()));
        let mut principal = officer("ADMIN");
        principal.station = None;
        principal.is_superuser = true;
        assert!(matches!(
            materializer.materialize(&values(), Vec::new(), &principal).await,
            Err(MaterializeError::NoStation)
        ));
    }

    #[tokio::test]
    async fn missing_field_is_reported() {
        let materializer = Materializer::new(Arc::new(MemoryReportRepository::default()));
        let mut incomplete = values();
        incomplete.remove("brand");
        assert!(matches!(
            materializer.materialize(&incomplete, Vec::new(), &officer("OYO01")).await,
            Err(MaterializeError::MissingField("brand"))
        ));
    }

    #[tokio::test]
    async fn storage_failure_is_persistence_error() {
        let materializer = Materializer::new(Arc::new(FailingReportRepository));
        assert!(matches!(
            materializer.materialize(&values(), Vec::new(), &officer("OYO01")).await,
            Err(MaterializeError::Persistence(_))
        ));
    }
}
