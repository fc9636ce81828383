//! Chat-platform API channel — posts messages directly with a bot token.

use async_trait::async_trait;
use std::time::Duration;

use herald_core::config::DeliveryConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::DeliveryChannel;

/// Direct API transport. Each profile maps to a channel id from the
/// delivery configuration; the same bot token covers all of them.
pub struct ApiChannel {
    config: DeliveryConfig,
    client: reqwest::Client,
}

impl ApiChannel {
    pub fn new(config: DeliveryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn channel_id(&self, profile: &str) -> Result<String> {
        self.config
            .destination(profile)
            .map(|d| d.channel_id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                HeraldError::Delivery(format!("no channel_id configured for profile '{profile}'"))
            })
    }
}

#[async_trait]
impl DeliveryChannel for ApiChannel {
    fn name(&self) -> &str {
        "api"
    }

    async fn deliver(&self, profile: &str, text: &str, _mention: Option<&str>) -> Result<()> {
        let channel_id = self.channel_id(profile)?;
        let url = format!(
            "{}/channels/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            channel_id
        );
        let body = serde_json::json!({ "content": text });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.config.api_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| HeraldError::Delivery(format!("API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(HeraldError::Delivery(format!(
                "API returned {status}: {detail}"
            )));
        }
        tracing::debug!("📢 API message posted to channel {channel_id}");
        Ok(())
    }
}
