//! API handlers and shared request helpers.

pub mod admin;
pub mod auth;
pub mod health;
pub mod lookup;
pub mod payments;
pub mod public_report;
pub mod reports;
pub mod wizard;


use axum::extract::Multipart;

use super::error::PortalError;
use crate::wizard::fields::{Submission, UploadedFile};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Collect a multipart form into a `Submission`.
///
/// Parts with a file name become uploads; everything else is a text field.
pub(crate) async fn read_submission(mut multipart: Multipart) -> Result<Submission, PortalError> {
    let mut submission = Submission::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| PortalError::MalformedBody(err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| PortalError::MalformedBody(err.body_text()))?;
                submission.insert_file(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| PortalError::MalformedBody(err.body_text()))?;
                submission.insert_field(&name, value);
            }
        }
    }
    Ok(submission)
}
