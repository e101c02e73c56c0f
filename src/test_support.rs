//! In-memory doubles shared by unit tests.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::{collections::HashMap, net::IpAddr, time::Duration};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    auth::{OfficerDirectory, Principal, Station},
    geo::{GeoLocator, Location},
    notify::{DeliveryError, NotificationMessage, NotificationSender},
    report::{
        materializer::attachment_info,
        payments::{PaymentError, PaymentGateway, PaymentRequest, PaymentStatus},
        repo::{RepoError, ReportRepository, DEVICE_IDENTIFIER_KEY, PAYMENT_REFERENCE_KEY},
        DeviceReport, ReportStatus, StationSummary,
    },
    session::{MemorySessionStore, SessionData, SessionKey, SessionStore},
    wizard::fields::UploadedFile,
    BoxFuture,
};

pub const TEST_PASSWORD: &str = "password123";

/// Officer whose station is derived from the username prefix.
pub fn officer(username: &str) -> Principal {
    let location: String = username.chars().take(3).collect();
    Principal {
        officer_id: Uuid::new_v4(),
        username: username.to_string(),
        email: Some(format!("officer.{username}@safeimei.com")),
        phone: Some("+2348012345678".to_string()),
        station: Some(Station {
            id: Uuid::new_v4(),
            name: format!("{location} State Command"),
            location,
        }),
        is_superuser: false,
    }
}

pub fn jpeg(field: &str, size: usize) -> UploadedFile {
    UploadedFile {
        field: field.to_string(),
        file_name: format!("{field}.jpg"),
        content_type: "image/jpeg".to_string(),
        bytes: vec![0xff; size],
    }
}

pub fn sample_report(imei: &str) -> DeviceReport {
    let now = Utc::now();
    DeviceReport {
        id: Uuid::now_v7(),
        owner_full_name: "Ngozi Adeyemi".to_string(),
        owner_phone_number: "08030000000".to_string(),
        owner_email: None,
        owner_address: None,
        imei: imei.to_string(),
        brand: "Apple".to_string(),
        model: "iPhone 14".to_string(),
        color: Some("Black".to_string()),
        device_phone_number: None,
        incident_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default(),
        incident_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap_or_default(),
        incident_type: "Robbery".to_string(),
        incident_location: Some("Oshodi".to_string()),
        ocr_verification_status: false,
        transaction_ref: "TRX-1".to_string(),
        status: ReportStatus::Stolen,
        reported_by: None,
        station_id: Uuid::new_v4(),
        attachments: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    officers: Vec<Principal>,
}

impl MemoryDirectory {
    /// Every officer signs in with [`TEST_PASSWORD`].
    pub fn with(officers: &[&Principal]) -> Self {
        Self {
            officers: officers.iter().map(|p| (*p).clone()).collect(),
        }
    }
}

impl OfficerDirectory for MemoryDirectory {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Option<Principal>>> {
        Box::pin(async move {
            Ok(self
                .officers
                .iter()
                .find(|p| p.username == username && password == TEST_PASSWORD)
                .cloned())
        })
    }

    fn lookup(&self, officer_id: Uuid) -> BoxFuture<'_, Result<Option<Principal>>> {
        Box::pin(async move {
            Ok(self
                .officers
                .iter()
                .find(|p| p.officer_id == officer_id)
                .cloned())
        })
    }

    fn station_contacts(&self, station_id: Uuid) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            Ok(self
                .officers
                .iter()
                .filter(|p| p.station.as_ref().map(|s| s.id) == Some(station_id))
                .filter_map(|p| p.email.clone())
                .collect())
        })
    }

    fn stations(&self) -> BoxFuture<'_, Result<Vec<Station>>> {
        Box::pin(async move {
            let mut stations: Vec<Station> = Vec::new();
            for station in self.officers.iter().filter_map(|p| p.station.clone()) {
                if !stations.iter().any(|s| s.id == station.id) {
                    stations.push(station);
                }
            }
            stations.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(stations)
        })
    }

    fn station(&self, station_id: Uuid) -> BoxFuture<'_, Result<Option<Station>>> {
        Box::pin(async move {
            Ok(self
                .officers
                .iter()
                .filter_map(|p| p.station.clone())
                .find(|s| s.id == station_id))
        })
    }
}

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<NotificationMessage>>,
}

impl RecordingSender {
    pub async fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().await.clone()
    }
}

impl NotificationSender for RecordingSender {
    fn send<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            self.sent.lock().await.push(message.clone());
            Ok(())
        })
    }
}

pub struct FailingSender;

impl NotificationSender for FailingSender {
    fn send<'a>(
        &'a self,
        _message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async { Err(DeliveryError::Rejected { status: 503 }) })
    }
}

/// Session store that keeps everything it is given and refuses deletes.
#[derive(Default)]
pub struct UndeletableSessionStore {
    pub inner: MemorySessionStore,
}

impl SessionStore for UndeletableSessionStore {
    fn load<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<Option<SessionData>>> {
        self.inner.load(key)
    }

    fn save<'a>(
        &'a self,
        key: &'a SessionKey,
        data: &'a SessionData,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        self.inner.save(key, data, ttl)
    }

    fn delete<'a>(&'a self, _key: &'a SessionKey) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(anyhow!("session store refused delete")) })
    }
}

#[derive(Default)]
struct Stored {
    reports: Vec<DeviceReport>,
    attachments: HashMap<Uuid, Vec<UploadedFile>>,
    contended_references: usize,
}

#[derive(Default)]
pub struct MemoryReportRepository {
    inner: Mutex<Stored>,
}

impl MemoryReportRepository {
    pub async fn insert(&self, report: DeviceReport) {
        self.inner.lock().await.reports.push(report);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.reports.len()
    }

    /// The next `count` `Payment Pending` inserts find their reference
    /// already taken by a concurrent writer.
    pub async fn contend_payment_references(&self, count: usize) {
        self.inner.lock().await.contended_references = count;
    }

    pub async fn attachment_count(&self, report_id: Uuid) -> usize {
        self.inner
            .lock()
            .await
            .attachments
            .get(&report_id)
            .map_or(0, Vec::len)
    }

    async fn find(&self, predicate: impl Fn(&DeviceReport) -> bool) -> Option<DeviceReport> {
        let stored = self.inner.lock().await;
        stored.reports.iter().find(|r| predicate(r)).cloned().map(|mut report| {
            if let Some(files) = stored.attachments.get(&report.id) {
                report.attachments = attachment_info(files);
            }
            report
        })
    }
}

impl ReportRepository for MemoryReportRepository {
    fn insert_unique<'a>(
        &'a self,
        report: &'a DeviceReport,
        attachments: &'a [UploadedFile],
    ) -> BoxFuture<'a, Result<(), RepoError>> {
        Box::pin(async move {
            let mut stored = self.inner.lock().await;
            if stored.reports.iter().any(|r| r.imei == report.imei) {
                return Err(RepoError::DuplicateKey(DEVICE_IDENTIFIER_KEY));
            }
            if report.status == ReportStatus::PaymentPending {
                let taken = stored.reports.iter().any(|r| {
                    r.status == ReportStatus::PaymentPending
                        && r.transaction_ref == report.transaction_ref
                });
                if taken || stored.contended_references > 0 {
                    stored.contended_references = stored.contended_references.saturating_sub(1);
                    return Err(RepoError::DuplicateKey(PAYMENT_REFERENCE_KEY));
                }
            }
            let mut row = report.clone();
            row.attachments = Vec::new();
            stored.reports.push(row);
            if !attachments.is_empty() {
                stored.attachments.insert(report.id, attachments.to_vec());
            }
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async move { Ok(self.find(|r| r.id == id).await) })
    }

    fn find_stolen_by_imei<'a>(
        &'a self,
        imei: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            Ok(self
                .find(|r| r.imei == imei && r.status == ReportStatus::Stolen)
                .await)
        })
    }

    fn find_by_transaction_ref<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move { Ok(self.find(|r| r.transaction_ref == reference).await) })
    }

    fn list_for_station<'a>(
        &'a self,
        station_id: Uuid,
        search: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<DeviceReport>>> {
        Box::pin(async move {
            let stored = self.inner.lock().await;
            let mut reports: Vec<DeviceReport> = stored
                .reports
                .iter()
                .filter(|r| r.station_id == station_id)
                .filter(|r| search.map_or(true, |s| r.imei.contains(s)))
                .cloned()
                .collect();
            reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(reports)
        })
    }

    fn station_summary(
        &self,
        station_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StationSummary>> {
        Box::pin(async move {
            let stored = self.inner.lock().await;
            let mut summary = StationSummary::default();
            for report in stored.reports.iter().filter(|r| r.station_id == station_id) {
                if report.created_at >= month_start {
                    summary.reports_this_month_count += 1;
                }
                match report.status {
                    ReportStatus::PendingReview => summary.pending_review_count += 1,
                    ReportStatus::Recovered => summary.recently_recovered_count += 1,
                    _ => {}
                }
            }
            Ok(summary)
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: ReportStatus,
    ) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            let mut stored = self.inner.lock().await;
            Ok(stored.reports.iter_mut().find(|r| r.id == id).map(|r| {
                r.status = status;
                r.updated_at = Utc::now();
                r.clone()
            }))
        })
    }

    fn transition_status_by_reference<'a>(
        &'a self,
        reference: &'a str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            let mut stored = self.inner.lock().await;
            Ok(stored
                .reports
                .iter_mut()
                .find(|r| r.transaction_ref == reference && r.status == from)
                .map(|r| {
                    r.status = to;
                    r.updated_at = Utc::now();
                    r.clone()
                }))
        })
    }
}

/// Repository whose every call fails.
pub struct FailingReportRepository;

impl ReportRepository for FailingReportRepository {
    fn insert_unique<'a>(
        &'a self,
        _report: &'a DeviceReport,
        _attachments: &'a [UploadedFile],
    ) -> BoxFuture<'a, Result<(), RepoError>> {
        Box::pin(async { Err(RepoError::Other(anyhow!("database unavailable"))) })
    }

    fn find_by_id(&self, _id: Uuid) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn find_stolen_by_imei<'a>(
        &'a self,
        _imei: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn find_by_transaction_ref<'a>(
        &'a self,
        _reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn list_for_station<'a>(
        &'a self,
        _station_id: Uuid,
        _search: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn station_summary(
        &self,
        _station_id: Uuid,
        _month_start: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StationSummary>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn update_status(
        &self,
        _id: Uuid,
        _status: ReportStatus,
    ) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }

    fn transition_status_by_reference<'a>(
        &'a self,
        _reference: &'a str,
        _from: ReportStatus,
        _to: ReportStatus,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async { Err(anyhow!("database unavailable")) })
    }
}

pub struct FakeGateway {
    status: PaymentStatus,
}

impl FakeGateway {
    pub fn paid() -> Self {
        Self {
            status: PaymentStatus::Paid,
        }
    }

    pub fn unpaid(status: &str) -> Self {
        Self {
            status: PaymentStatus::NotPaid(status.to_string()),
        }
    }
}

impl PaymentGateway for FakeGateway {
    fn initialize<'a>(
        &'a self,
        request: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<String, PaymentError>> {
        Box::pin(async move {
            Ok(format!(
                "https://checkout.paystack.test/{}",
                request.reference
            ))
        })
    }

    fn verify<'a>(&'a self, _reference: &'a str) -> BoxFuture<'a, Result<PaymentStatus, PaymentError>> {
        Box::pin(async move { Ok(self.status.clone()) })
    }
}

/// Locator that resolves every address to the same place.
pub struct FixedLocator;

impl GeoLocator for FixedLocator {
    fn locate(&self, _ip: Option<IpAddr>) -> BoxFuture<'_, Location> {
        Box::pin(async {
            Location {
                city: "Ikeja".to_string(),
                country: "NG".to_string(),
                full: "Ikeja, Lagos, NG".to_string(),
            }
        })
    }
}
