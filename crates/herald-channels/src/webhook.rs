//! Webhook channel — posts messages through per-profile webhook URLs.
//!
//! No bot session or token needed, which makes it the right transport
//! for the standalone dispatch job (cron or one-shot invocation).

use async_trait::async_trait;
use std::time::Duration;

use herald_core::config::DeliveryConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::DeliveryChannel;

pub struct WebhookChannel {
    config: DeliveryConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: DeliveryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn webhook_url(&self, profile: &str) -> Result<String> {
        self.config
            .destination(profile)
            .map(|d| d.webhook_url.clone())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                HeraldError::Delivery(format!("no webhook_url configured for profile '{profile}'"))
            })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, profile: &str, text: &str, _mention: Option<&str>) -> Result<()> {
        let url = self.webhook_url(profile)?;
        let body = serde_json::json!({ "content": text });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HeraldError::Delivery(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(HeraldError::Delivery(format!(
                "webhook returned {status}: {detail}"
            )));
        }
        tracing::debug!("📢 Webhook message posted for profile {profile}");
        Ok(())
    }
}
