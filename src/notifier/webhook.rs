use async_trait::async_trait;

use super::Notifier;
use crate::error::ApiError;
use crate::models::AlertNotification;

/// Posts the full alert payload as JSON to a generic webhook endpoint.
pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            url,
            client: super::http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn send(&self, notification: &AlertNotification) -> Result<(), ApiError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| ApiError::NotifierFailure("webhook".to_string(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::NotifierFailure(
                "webhook".to_string(),
                format!("endpoint returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
