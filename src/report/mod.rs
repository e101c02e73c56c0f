//! Device reports: the persisted record, its status lifecycle and storage.

pub mod materializer;
pub mod payments;
mod postgres;
pub mod public;
pub mod repo;
pub mod review;

pub use postgres::PgReportRepository;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ReportStatus {
    Stolen,
    #[serde(rename = "Pending")]
    PendingReview,
    Recovered,
    #[serde(rename = "Payment Pending")]
    PaymentPending,
    Rejected,
}

impl ReportStatus {
    /// Status stamped on reports created by officers.
    pub const INITIAL: Self = Self::Stolen;

    /// Stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stolen => "Stolen",
            Self::PendingReview => "Pending",
            Self::Recovered => "Recovered",
            Self::PaymentPending => "Payment Pending",
            Self::Rejected => "Rejected",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Stolen => "Stolen",
            Self::PendingReview => "Pending Review",
            Self::Recovered => "Recovered",
            Self::PaymentPending => "Awaiting Payment",
            Self::Rejected => "Rejected",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Stolen" => Some(Self::Stolen),
            "Pending" => Some(Self::PendingReview),
            "Recovered" => Some(Self::Recovered),
            "Payment Pending" => Some(Self::PaymentPending),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a stored proof document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttachmentInfo {
    /// Form field the file was uploaded through, e.g. `police_report_image`.
    pub kind: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeviceReport {
    pub id: Uuid,

    pub owner_full_name: String,
    pub owner_phone_number: String,
    pub owner_email: Option<String>,
    pub owner_address: Option<String>,

    pub imei: String,
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
    pub device_phone_number: Option<String>,

    pub incident_date: NaiveDate,
    pub incident_time: NaiveTime,
    pub incident_type: String,
    pub incident_location: Option<String>,

    pub ocr_verification_status: bool,
    pub transaction_ref: String,
    pub status: ReportStatus,

    pub reported_by: Option<Uuid>,
    pub station_id: Uuid,
    /// Loaded on detail reads only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentInfo>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dashboard counters for one station.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StationSummary {
    pub reports_this_month_count: i64,
    pub pending_review_count: i64,
    pub recently_recovered_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            ReportStatus::Stolen,
            ReportStatus::PendingReview,
            ReportStatus::Recovered,
            ReportStatus::PaymentPending,
            ReportStatus::Rejected,
        ] {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::parse("stolen"), None);
    }

    #[test]
    fn status_serializes_as_stored_value() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_value(ReportStatus::PaymentPending)?,
            serde_json::json!("Payment Pending")
        );
        assert_eq!(ReportStatus::PendingReview.label(), "Pending Review");
        assert_eq!(ReportStatus::INITIAL, ReportStatus::Stolen);
        Ok(())
    }
}
