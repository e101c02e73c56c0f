//! Email delivery through the Resend HTTP API.

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, instrument};

use super::{DeliveryError, NotificationMessage, NotificationSender};
use crate::{BoxFuture, APP_USER_AGENT};

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ResendEmailSender {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    from: String,
}

impl ResendEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: RESEND_API_URL.to_string(),
            api_key,
            from: from.into(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[instrument(skip(self, message), fields(to = %message.destination))]
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&email_payload(&self.from, message))
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let reason = body.get("message").and_then(Value::as_str).unwrap_or("");
        error!("Resend rejected message ({status}): {reason}");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
        })
    }
}

fn email_payload(from: &str, message: &NotificationMessage) -> Value {
    json!({
        "from": from,
        "to": [message.destination],
        "subject": message.subject,
        "text": message.body,
    })
}

impl NotificationSender for ResendEmailSender {
    fn send<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(self.deliver(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_targets_single_recipient() {
        let message = NotificationMessage::new(
            "officer.LAG01@safeimei.com",
            "Your SafeIMEI Login Code",
            "Your verification code is: 042137",
        );
        let payload = email_payload("SafeIMEI <onboarding@resend.dev>", &message);
        assert_eq!(payload["from"], "SafeIMEI <onboarding@resend.dev>");
        assert_eq!(payload["to"], json!(["officer.LAG01@safeimei.com"]));
        assert_eq!(payload["subject"], "Your SafeIMEI Login Code");
        assert_eq!(payload["text"], "Your verification code is: 042137");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() -> Result<()> {
        let sender = ResendEmailSender::new(SecretString::from("re_test".to_string()), "from@x")?
            .with_endpoint("http://127.0.0.1:9/emails");
        let message = NotificationMessage::new("to@example.com", "s", "b");
        assert!(matches!(
            sender.send(&message).await,
            Err(DeliveryError::Transport(_))
        ));
        Ok(())
    }
}
