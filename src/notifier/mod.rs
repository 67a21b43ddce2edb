mod slack;
mod webhook;

pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::AlertNotification;

/// Outbound alert channel. The alerting engine owns fan-out and error
/// isolation; implementations are oblivious to each other and must respect
/// their own transport timeouts so a slow channel cannot stall the loop.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn enabled(&self) -> bool;
    async fn send(&self, notification: &AlertNotification) -> Result<(), ApiError>;
}

/// Shared HTTP client for notifier transports: 5s connect, 10s total.
pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .build()?)
}
