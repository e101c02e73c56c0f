//! Public IMEI lookup and anonymous sighting alerts.

use anyhow::Result;
use serde::Serialize;
use std::net::IpAddr;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    auth::OfficerDirectory,
    geo::{GeoLocator, Location},
    notify::{NotificationMessage, NotificationSender},
    report::{repo::ReportRepository, DeviceReport},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Stolen,
    Safe,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LookupResult {
    pub status: Verdict,
    pub message: String,
    pub imei: String,
    /// Where the lookup came from; only reported for stolen devices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Check whether `imei` belongs to a device currently reported stolen.
///
/// # Errors
/// Returns an error if the report store cannot be queried.
pub async fn check_device(
    repo: &dyn ReportRepository,
    geo: &dyn GeoLocator,
    imei: &str,
    requester: Option<IpAddr>,
) -> Result<LookupResult> {
    let imei = imei.trim();
    match repo.find_stolen_by_imei(imei).await? {
        Some(_) => Ok(LookupResult {
            status: Verdict::Stolen,
            message: format!("This device (IMEI: {imei}) has been reported stolen."),
            imei: imei.to_string(),
            location: Some(geo.locate(requester).await),
        }),
        None => Ok(LookupResult {
            status: Verdict::Safe,
            message: format!("This device (IMEI: {imei}) has not been reported stolen."),
            imei: imei.to_string(),
            location: None,
        }),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent { recipient: String },
    /// The IMEI is not reported stolen.
    NotStolen,
    /// Nobody at the reporting station has an email on file.
    NoRecipient,
}

async fn alert_recipient(
    directory: &dyn OfficerDirectory,
    report: &DeviceReport,
) -> Result<Option<String>> {
    if let Some(officer_id) = report.reported_by {
        let reporter = directory.lookup(officer_id).await?;
        if let Some(email) = reporter
            .and_then(|officer| officer.email)
            .filter(|email| !email.trim().is_empty())
        {
            return Ok(Some(email));
        }
    }
    Ok(directory
        .station_contacts(report.station_id)
        .await?
        .into_iter()
        .next())
}

fn alert_message(
    recipient: &str,
    report: &DeviceReport,
    station_name: &str,
    location: &Location,
    requester: Option<IpAddr>,
) -> NotificationMessage {
    let ip = requester.map_or_else(|| "Unknown".to_string(), |ip| ip.to_string());
    NotificationMessage::new(
        recipient,
        format!("Anonymous Tip: Stolen Device (IMEI: {})", report.imei),
        format!(
            "ALERT: A stolen device has just been scanned on SafeIMEI.\n\n\
             Device Details:\n\
             - IMEI: {}\n\
             - Brand: {} {}\n\
             - Reported at: {station_name}\n\n\
             Sighting Information:\n\
             - Approx Location: {}\n\
             - IP Address: {ip}\n\n\
             This is an automated intelligence alert.",
            report.imei, report.brand, report.model, location.full
        ),
    )
}

/// Tip off the officer responsible for a stolen device that it was scanned.
///
/// # Errors
/// Storage and directory failures, and delivery failures when a recipient
/// was found.
pub async fn send_alert(
    repo: &dyn ReportRepository,
    directory: &dyn OfficerDirectory,
    sender: &dyn NotificationSender,
    geo: &dyn GeoLocator,
    imei: &str,
    requester: Option<IpAddr>,
) -> Result<AlertOutcome> {
    let Some(report) = repo.find_stolen_by_imei(imei.trim()).await? else {
        return Ok(AlertOutcome::NotStolen);
    };

    let Some(recipient) = alert_recipient(directory, &report).await? else {
        warn!(imei = %report.imei, "no recipient found for alert");
        return Ok(AlertOutcome::NoRecipient);
    };

    let station_name = directory
        .station(report.station_id)
        .await?
        .map_or_else(|| "Unknown Station".to_string(), |station| station.name);
    let location = geo.locate(requester).await;

    sender
        .send(&alert_message(
            &recipient,
            &report,
            &station_name,
            &location,
            requester,
        ))
        .await?;
    info!(imei = %report.imei, recipient = %recipient, "alert sent");

    Ok(AlertOutcome::Sent { recipient })
}
