//! Event lifecycle hooks — the surface an event source (scraper,
//! management API, manual tooling) calls into when its event set changes.
//!
//! Saving an event (create and update are the same hook) replaces its
//! pending notification set; removing it clears the set; a resync
//! reconciles the whole store against a full event list, dropping rows
//! for events that no longer exist. Sent rows always survive as audit.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use herald_core::error::Result;
use herald_core::types::{Event, Notification};

use crate::policy::PolicyTable;
use crate::scheduler::NotificationScheduler;
use crate::store::NotificationStore;
use crate::templates::TemplateRegistry;

pub struct EventLifecycle {
    scheduler: NotificationScheduler,
    store: Arc<NotificationStore>,
}

impl EventLifecycle {
    pub fn new(
        store: Arc<NotificationStore>,
        policy: PolicyTable,
        templates: TemplateRegistry,
        grace_window_min: i64,
    ) -> Self {
        let scheduler = NotificationScheduler::new(
            Arc::clone(&store),
            policy,
            templates,
            grace_window_min,
        );
        Self { scheduler, store }
    }

    /// An event was created or its times/fields changed. Replaces the
    /// pending notification set for it.
    pub fn on_event_saved(&self, event: &Event) -> Result<usize> {
        self.scheduler
            .schedule_event(event, chrono::Utc::now().timestamp())
    }

    /// An event was deleted upstream. Pending notifications go with it.
    pub fn on_event_removed(&self, event_id: &str) -> Result<usize> {
        self.scheduler.unschedule(event_id)
    }

    /// Reconcile against a full event list: schedule every event, then
    /// drop pending rows for events no longer present. Invalid events are
    /// skipped with a warning so one bad record never stalls the rest.
    pub fn on_events_resynced(&self, events: &[Event]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut scheduled = 0;
        let mut live: HashSet<&str> = HashSet::with_capacity(events.len());

        for event in events {
            match self.scheduler.schedule_event(event, now) {
                Ok(_) => {
                    live.insert(event.event_id.as_str());
                    scheduled += 1;
                }
                Err(e) => warn!("⚠️ Skipping event '{}' during resync: {e}", event.event_id),
            }
        }

        let mut orphaned = 0;
        for event_id in self.store.pending_event_ids()? {
            if !live.contains(event_id.as_str()) {
                orphaned += self.store.delete_for_event(&event_id)?;
            }
        }

        info!(
            "📅 Resync complete: {scheduled} event(s) scheduled, {orphaned} orphaned row(s) removed"
        );
        Ok(scheduled)
    }

    /// Everything scheduled for one event, for display/management.
    pub fn notifications_for_event(&self, event_id: &str) -> Result<Vec<Notification>> {
        self.store.list_for_event(event_id)
    }

    /// Unsent notifications, optionally filtered by profile.
    pub fn pending(&self, profile: Option<&str>) -> Result<Vec<Notification>> {
        self.store.list_pending(profile)
    }

    /// Manually drop one scheduled notification. Sent rows are refused.
    pub fn remove_notification(&self, id: i64) -> Result<bool> {
        self.store.delete_one(id)
    }

    /// Set or clear the custom-message override on an unsent notification.
    pub fn set_custom_message(&self, id: i64, message: Option<&str>) -> Result<bool> {
        self.store.set_custom_message(id, message)
    }
}
