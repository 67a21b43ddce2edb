use async_trait::async_trait;
use serde_json::json;

use super::Notifier;
use crate::error::ApiError;
use crate::models::AlertNotification;

/// Posts alert messages to a Slack incoming-webhook URL.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            webhook_url,
            client: super::http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, notification: &AlertNotification) -> Result<(), ApiError> {
        let Some(url) = self.webhook_url.as_deref() else {
            return Ok(());
        };

        let text = format!(
            ":rotating_light: Rate-limit alert *{}*: policy `{}` deny rate {:.1}% \
             over the last {}s (threshold {}%, {} of {} requests denied)",
            notification.rule_name,
            notification.policy_name,
            notification.deny_rate,
            notification.window_seconds,
            notification.threshold_percentage,
            notification.denied_requests,
            notification.total_requests,
        );

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ApiError::NotifierFailure("slack".to_string(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::NotifierFailure(
                "slack".to_string(),
                format!("webhook returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
