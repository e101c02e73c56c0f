//! SMS delivery through a generic JSON gateway.
//!
//! The gateway receives `POST {url}` with `{"to": "...", "message": "..."}` and
//! an optional bearer token.

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::{error, instrument};

use super::{DeliveryError, NotificationMessage, NotificationSender};
use crate::{BoxFuture, APP_USER_AGENT};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpSmsSender {
    client: Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpSmsSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }

    #[instrument(skip(self, message))]
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.url).json(&json!({
            "to": message.destination,
            "message": message.body,
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            error!("SMS gateway rejected message: {status}");
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

impl NotificationSender for HttpSmsSender {
    fn send<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(self.deliver(message))
    }
}
