//! Storage contract for device reports.

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{DeviceReport, ReportStatus, StationSummary};
use crate::{wizard::fields::UploadedFile, BoxFuture};

/// `DuplicateKey` field for a clash on the IMEI.
pub const DEVICE_IDENTIFIER_KEY: &str = "imei";
/// `DuplicateKey` field for a `Payment Pending` report reusing a reference.
pub const PAYMENT_REFERENCE_KEY: &str = "transaction_ref";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("unique constraint violated on {0}")]
    DuplicateKey(&'static str),
    #[error("referenced row does not exist for {0}")]
    MissingReference(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait ReportRepository: Send + Sync {
    /// Insert a report and its attachments atomically.
    ///
    /// A report whose `imei` already exists fails with
    /// `RepoError::DuplicateKey("imei")` and nothing is written. A
    /// `Payment Pending` report whose `transaction_ref` is already held by
    /// another `Payment Pending` report fails with
    /// `RepoError::DuplicateKey("transaction_ref")`.
    fn insert_unique<'a>(
        &'a self,
        report: &'a DeviceReport,
        attachments: &'a [UploadedFile],
    ) -> BoxFuture<'a, Result<(), RepoError>>;

    /// Report with attachment metadata.
    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<DeviceReport>>>;

    fn find_stolen_by_imei<'a>(&'a self, imei: &'a str)
        -> BoxFuture<'a, Result<Option<DeviceReport>>>;

    fn find_by_transaction_ref<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>>;

    /// Station reports, newest first, optionally filtered by an IMEI substring.
    fn list_for_station<'a>(
        &'a self,
        station_id: Uuid,
        search: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<DeviceReport>>>;

    fn station_summary(
        &self,
        station_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StationSummary>>;

    /// Set the status and bump `updated_at`; `None` when the report is gone.
    fn update_status(
        &self,
        id: Uuid,
        status: ReportStatus,
    ) -> BoxFuture<'_, Result<Option<DeviceReport>>>;

    /// Move the report with `reference` from `from` to `to`.
    ///
    /// Returns the updated report only if this call performed the transition.
    fn transition_status_by_reference<'a>(
        &'a self,
        reference: &'a str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>>;
}
