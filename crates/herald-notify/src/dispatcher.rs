//! Notification dispatcher — the poll-driven delivery loop.
//!
//! Each cycle: reap stale claims, claim due rows, render each into its
//! final message text, deliver through the configured channel, finalize.
//! A failed delivery releases the claim so the row retries on the next
//! cycle. The dispatcher holds no state between cycles; everything it
//! needs is in the store, so it can run in the long-lived process or as
//! a standalone one-shot job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use herald_core::config::DeliveryConfig;
use herald_core::error::Result;
use herald_core::traits::DeliveryChannel;
use herald_core::types::{Anchor, Notification};

use crate::store::NotificationStore;
use crate::templates::{format_relative, TemplateRegistry};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub reaped: usize,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    store: Arc<NotificationStore>,
    channel: Arc<dyn DeliveryChannel>,
    templates: TemplateRegistry,
    delivery: DeliveryConfig,
    batch_limit: usize,
    claim_timeout_min: i64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
        templates: TemplateRegistry,
        delivery: DeliveryConfig,
        batch_limit: usize,
        claim_timeout_min: i64,
    ) -> Self {
        Self {
            store,
            channel,
            templates,
            delivery,
            batch_limit,
            claim_timeout_min,
        }
    }

    /// Run one poll cycle at instant `now` (UNIX seconds).
    pub async fn run_cycle(&self, now: i64) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        stats.reaped = self
            .store
            .reap_stale_claims(now - self.claim_timeout_min * 60)?;
        if stats.reaped > 0 {
            warn!("⚠️ Reaped {} stale claim(s) back to pending", stats.reaped);
        }

        let due = self.store.claim_due(now, self.batch_limit)?;
        stats.claimed = due.len();

        for notification in &due {
            let text = self.render(notification);
            let mention = self.delivery.mention(&notification.profile);
            match self
                .channel
                .deliver(&notification.profile, &text, mention)
                .await
            {
                Ok(()) => {
                    self.store.finalize_sent(notification.id)?;
                    stats.sent += 1;
                    info!(
                        "📢 Sent notification #{} '{}' [{}]",
                        notification.id, notification.title, notification.profile
                    );
                }
                Err(e) => {
                    // Back to pending; it is still due and retries next cycle.
                    self.store.release(notification.id)?;
                    stats.failed += 1;
                    warn!(
                        "⚠️ Delivery failed for notification #{} '{}': {e}",
                        notification.id, notification.title
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Produce the final message text. A custom message wins outright;
    /// otherwise the stored template key is rendered with the row's
    /// snapshot fields.
    fn render(&self, n: &Notification) -> String {
        if let Some(custom) = &n.custom_message {
            return custom.clone();
        }
        let role = self.delivery.mention(&n.profile).unwrap_or("");
        let time = format_relative(n.event_time);
        let action = match n.anchor {
            Anchor::Start => "starting",
            Anchor::End => "ending",
        };
        self.templates.render(
            &n.template_key,
            &[
                ("role", role),
                ("name", &n.title),
                ("category", &n.category),
                ("phase", n.phase.as_deref().unwrap_or("")),
                ("participant", n.sub_item.as_deref().unwrap_or("")),
                ("time", &time),
                ("action", action),
            ],
        )
    }
}

/// Spawn the dispatcher as a background tokio task polling every
/// `interval_secs`. Cycle errors are logged, never fatal.
pub fn spawn_dispatcher(
    dispatcher: Arc<Dispatcher>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("🔔 Dispatcher started (poll every {interval_secs}s)");
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            match dispatcher.run_cycle(now).await {
                Ok(stats) if stats.claimed > 0 => {
                    info!(
                        "🔔 Cycle: {} sent, {} failed, {} reaped",
                        stats.sent, stats.failed, stats.reaped
                    );
                }
                Ok(_) => {}
                Err(e) => error!("⚠️ Dispatch cycle failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use herald_core::config::DestinationEntry;
    use herald_core::error::HeraldError;
    use herald_core::types::{NewNotification, NotificationStatus};

    /// Records deliveries; fails the first `fail_first` calls.
    struct RecordingChannel {
        delivered: Mutex<Vec<(String, String, Option<String>)>>,
        fail_first: AtomicUsize,
    }

    impl RecordingChannel {
        fn new(fail_first: usize) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_first: AtomicUsize::new(fail_first),
            }
        }
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(
            &self,
            profile: &str,
            text: &str,
            mention: Option<&str>,
        ) -> herald_core::error::Result<()> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HeraldError::Delivery("injected failure".into()));
            }
            self.delivered.lock().unwrap().push((
                profile.to_string(),
                text.to_string(),
                mention.map(str::to_string),
            ));
            Ok(())
        }
    }

    fn test_setup(
        name: &str,
        fail_first: usize,
    ) -> (Dispatcher, Arc<NotificationStore>, Arc<RecordingChannel>, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("herald-disp-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).ok();
        let store = Arc::new(NotificationStore::open(&dir.join("test.db")).unwrap());
        let channel = Arc::new(RecordingChannel::new(fail_first));
        let delivery = DeliveryConfig {
            destinations: vec![DestinationEntry {
                profile: "G1".into(),
                channel_id: "123".into(),
                webhook_url: String::new(),
                mention: Some("<@&42>".into()),
            }],
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&channel) as Arc<dyn DeliveryChannel>,
            TemplateRegistry::builtin(),
            delivery,
            25,
            10,
        );
        (dispatcher, store, channel, dir)
    }

    fn due_row(event_id: &str, fire_at: i64) -> NewNotification {
        NewNotification {
            event_id: event_id.into(),
            profile: "G1".into(),
            category: "Character Banner".into(),
            title: "Spring Banner".into(),
            anchor: Anchor::End,
            offset_minutes: 1440,
            fire_at,
            event_time: fire_at + 1440 * 60,
            template_key: "character_banner_end".into(),
            phase: None,
            sub_item: None,
        }
    }

    #[tokio::test]
    async fn test_cycle_renders_and_sends() {
        let (dispatcher, store, channel, dir) = test_setup("send", 0);
        store.upsert(&due_row("ev", 100)).unwrap();

        let stats = dispatcher.run_cycle(200).await.unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);

        let delivered = channel.delivered.lock().unwrap();
        let (profile, text, mention) = &delivered[0];
        assert_eq!(profile, "G1");
        let event_time = 100 + 1440 * 60;
        assert_eq!(
            text,
            &format!("<@&42>, The **Spring Banner** banner ends <t:{event_time}:R>!")
        );
        assert_eq!(mention.as_deref(), Some("<@&42>"));
        drop(delivered);

        let row = &store.list_for_event("ev").unwrap()[0];
        assert_eq!(row.status, NotificationStatus::Sent);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_custom_message_delivered_verbatim() {
        let (dispatcher, store, channel, dir) = test_setup("custom", 0);
        store.upsert(&due_row("ev", 100)).unwrap();
        let id = store.list_for_event("ev").unwrap()[0].id;
        store
            .set_custom_message(id, Some("Maintenance moved to 02:00 UTC"))
            .unwrap();

        dispatcher.run_cycle(200).await.unwrap();
        let delivered = channel.delivered.lock().unwrap();
        assert_eq!(delivered[0].1, "Maintenance moved to 02:00 UTC");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failure_releases_then_retries() {
        let (dispatcher, store, channel, dir) = test_setup("retry", 1);
        store.upsert(&due_row("ev", 100)).unwrap();

        let stats = dispatcher.run_cycle(200).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sent, 0);
        let row = &store.list_for_event("ev").unwrap()[0];
        assert_eq!(row.status, NotificationStatus::Pending);

        // Next cycle succeeds.
        let stats = dispatcher.run_cycle(260).await.unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(channel.delivered.lock().unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_stale_claim_reaped_then_sent() {
        let (dispatcher, store, channel, dir) = test_setup("reap", 0);
        store.upsert(&due_row("ev", 100)).unwrap();

        // A previous dispatcher claimed at t=200 and died.
        let claimed = store.claim_due(200, 10).unwrap();
        assert_eq!(claimed.len(), 1);

        // Twenty minutes later the claim is past the 10-minute timeout.
        let stats = dispatcher.run_cycle(200 + 20 * 60).await.unwrap();
        assert_eq!(stats.reaped, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(channel.delivered.lock().unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_not_due_rows_untouched() {
        let (dispatcher, store, channel, dir) = test_setup("notdue", 0);
        store.upsert(&due_row("ev", 5_000)).unwrap();

        let stats = dispatcher.run_cycle(200).await.unwrap();
        assert_eq!(stats, CycleStats::default());
        assert!(channel.delivered.lock().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unconfigured_profile_has_no_mention() {
        let (dispatcher, store, channel, dir) = test_setup("nomention", 0);
        let mut row = due_row("ev", 100);
        row.profile = "AK".into();
        store.upsert(&row).unwrap();

        dispatcher.run_cycle(200).await.unwrap();
        let delivered = channel.delivered.lock().unwrap();
        assert!(delivered[0].1.starts_with(", The **Spring Banner**"));
        assert_eq!(delivered[0].2, None);
        std::fs::remove_dir_all(&dir).ok();
    }
}
