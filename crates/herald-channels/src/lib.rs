//! # Herald Channels
//! Delivery channel implementations.
//!
//! Two transports, selected by configuration rather than code branches:
//! the chat-platform API (long-lived bot process) and per-profile
//! webhooks (standalone jobs with no bot session).

pub mod api;
pub mod webhook;

use std::sync::Arc;

use herald_core::config::DeliveryConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::DeliveryChannel;

pub use api::ApiChannel;
pub use webhook::WebhookChannel;

/// Build the delivery channel named by `delivery.transport`.
pub fn channel_from_config(config: &DeliveryConfig) -> Result<Arc<dyn DeliveryChannel>> {
    match config.transport.as_str() {
        "api" => Ok(Arc::new(ApiChannel::new(config.clone()))),
        "webhook" => Ok(Arc::new(WebhookChannel::new(config.clone()))),
        other => Err(HeraldError::Config(format!(
            "unknown delivery transport '{other}' (expected \"api\" or \"webhook\")"
        ))),
    }
}
