//! The delivery seam between the dispatcher and concrete transports.

use async_trait::async_trait;

use crate::error::Result;

/// Posts a rendered notification to the chat platform.
///
/// The destination (channel id, webhook URL) is resolved from `profile` by
/// the implementation's own configuration — the engine never knows about
/// platform addressing. Any non-success outcome (network error, non-2xx,
/// timeout) must come back as `HeraldError::Delivery` so the dispatcher
/// releases the claim for retry on the next poll cycle.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Transport name for logs ("api", "webhook", ...).
    fn name(&self) -> &str;

    /// Deliver `text` to the destination configured for `profile`.
    /// `mention` is the role-mention token for the profile, when one is
    /// configured; transports may use it for platform mention controls or
    /// ignore it (the rendered text already carries it).
    async fn deliver(&self, profile: &str, text: &str, mention: Option<&str>) -> Result<()>;
}
