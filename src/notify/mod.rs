//! Outbound notifications (email and SMS).
//!
//! Delivery is pluggable: `LogNotificationSender` for local development,
//! `ResendEmailSender` for email, `HttpSmsSender` for an SMS gateway and
//! `ChannelRouter` to send each destination through the matching transport.

mod resend;
mod sms;

pub use resend::ResendEmailSender;
pub use sms::HttpSmsSender;

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::BoxFuture;

/// A single message for a single destination (email address or phone number).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationMessage {
    pub destination: String,
    pub subject: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn new(
        destination: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_email(&self) -> bool {
        self.destination.contains('@')
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}")]
    Rejected { status: u16 },
    #[error("no transport configured for destination")]
    Unroutable,
}

pub trait NotificationSender: Send + Sync {
    fn send<'a>(&'a self, message: &'a NotificationMessage)
        -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// Development sender that only logs.
#[derive(Clone, Debug, Default)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            info!(
                destination = %message.destination,
                subject = %message.subject,
                "notification (log sender): {}",
                message.body
            );
            Ok(())
        })
    }
}

/// Sends email destinations through one transport and phone numbers through another.
#[derive(Clone)]
pub struct ChannelRouter {
    email: Arc<dyn NotificationSender>,
    sms: Option<Arc<dyn NotificationSender>>,
}

impl ChannelRouter {
    #[must_use]
    pub fn new(email: Arc<dyn NotificationSender>) -> Self {
        Self { email, sms: None }
    }

    #[must_use]
    pub fn with_sms(mut self, sms: Arc<dyn NotificationSender>) -> Self {
        self.sms = Some(sms);
        self
    }
}

impl NotificationSender for ChannelRouter {
    fn send<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            if message.is_email() {
                self.email.send(message).await
            } else if let Some(sms) = &self.sms {
                sms.send(message).await
            } else {
                Err(DeliveryError::Unroutable)
            }
        })
    }
}
