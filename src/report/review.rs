//! Officer review actions on an existing report.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{repo::ReportRepository, DeviceReport, ReportStatus};
use crate::notify::{NotificationMessage, NotificationSender};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    /// Verified: the device is blacklisted.
    Approve,
    Reject,
    MarkRecovered,
    /// Silent correction back to stolen.
    MarkStolen,
}

impl ReviewAction {
    #[must_use]
    pub fn target_status(self) -> ReportStatus {
        match self {
            Self::Approve | Self::MarkStolen => ReportStatus::Stolen,
            Self::Reject => ReportStatus::Rejected,
            Self::MarkRecovered => ReportStatus::Recovered,
        }
    }

    /// `(subject, body)` sent to the owner, if any.
    #[must_use]
    pub fn owner_notice(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Approve => Some(("Report Verified", "Your device is now blacklisted.")),
            Self::Reject => Some(("Report Rejected", "Your report was rejected.")),
            Self::MarkRecovered => Some((
                "Device Recovered",
                "Your device is no longer blacklisted.",
            )),
            Self::MarkStolen => None,
        }
    }
}

/// Apply `action` to `report` and notify the owner.
///
/// The owner notice is best effort: a delivery failure is logged and the
/// status change stands.
///
/// # Errors
/// Returns an error if the status update fails or the report disappeared.
pub async fn apply_review(
    repo: &dyn ReportRepository,
    sender: &dyn NotificationSender,
    report: &DeviceReport,
    action: ReviewAction,
) -> Result<DeviceReport> {
    let updated = repo
        .update_status(report.id, action.target_status())
        .await?
        .context("report vanished during review")?;

    info!(
        report_id = %updated.id,
        status = %updated.status,
        "report reviewed"
    );

    if let (Some((subject, body)), Some(email)) = (action.owner_notice(), &updated.owner_email) {
        let message = NotificationMessage::new(email.as_str(), subject, body);
        if let Err(err) = sender.send(&message).await {
            warn!(report_id = %updated.id, "failed to send review notice: {err}");
        }
    }

    Ok(updated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{sample_report, FailingSender, MemoryReportRepository, RecordingSender};

    #[test]
    fn actions_map_to_statuses() {
        assert_eq!(ReviewAction::Approve.target_status(), ReportStatus::Stolen);
        assert_eq!(ReviewAction::Reject.target_status(), ReportStatus::Rejected);
        assert_eq!(
            ReviewAction::MarkRecovered.target_status(),
            ReportStatus::Recovered
        );
        assert_eq!(ReviewAction::MarkStolen.target_status(), ReportStatus::Stolen);
        assert!(ReviewAction::MarkStolen.owner_notice().is_none());
    }

    #[tokio::test]
    async fn review_updates_and_notifies_owner() {
        let repo = MemoryReportRepository::default();
        let mut report = sample_report("490154203237518");
        report.status = ReportStatus::PendingReview;
        report.owner_email = Some("owner@example.com".to_string());
        repo.insert(report.clone()).await;
        let sender = RecordingSender::default();

        let updated = apply_review(&repo, &sender, &report, ReviewAction::MarkRecovered)
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::Recovered);
        assert!(updated.updated_at >= report.updated_at);

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "owner@example.com");
        assert_eq!(sent[0].subject, "Device Recovered");
    }

    #[tokio::test]
    async fn notice_failure_does_not_undo_review() {
        let repo = MemoryReportRepository::default();
        let mut report = sample_report("490154203237519");
        report.owner_email = Some("owner@example.com".to_string());
        repo.insert(report.clone()).await;

        let updated = apply_review(&repo, &FailingSender, &report, ReviewAction::Reject)
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::Rejected);
    }
}
