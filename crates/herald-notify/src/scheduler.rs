//! Notification scheduler — expands an event into its notification rows
//! and writes them in one transaction.
//!
//! Three expansion shapes:
//! - simple: one row per policy rule, offset before start or end
//! - phased: policy start rules become reminders, each phase gets a row
//!   at its own start, policy end rules close the event out
//! - sequential: like phased, but per-participant unlock rows
//!
//! Expansion is pure; the only side effect is the store write. Calling
//! it again for the same event replaces the pending set (sent rows are
//! left alone by the store), so create and update are the same path.

use std::sync::Arc;

use tracing::{debug, info};

use herald_core::error::Result;
use herald_core::types::{Anchor, Event, NewNotification};

use crate::policy::PolicyTable;
use crate::store::NotificationStore;
use crate::templates::TemplateRegistry;

pub struct NotificationScheduler {
    store: Arc<NotificationStore>,
    policy: PolicyTable,
    templates: TemplateRegistry,
    /// Minutes of past-due tolerance. Fire-times older than this are
    /// dropped at expansion instead of scheduled.
    grace_window_min: i64,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<NotificationStore>,
        policy: PolicyTable,
        templates: TemplateRegistry,
        grace_window_min: i64,
    ) -> Self {
        Self {
            store,
            policy,
            templates,
            grace_window_min,
        }
    }

    /// Validate, expand, and write the notification set for an event.
    /// Returns the number of rows now scheduled. Safe to call repeatedly;
    /// an unchanged event leaves the store unchanged.
    pub fn schedule_event(&self, event: &Event, now: i64) -> Result<usize> {
        event.validate()?;
        let rows = self.expand(event, now);
        let inserted = self.store.replace_for_event(&event.event_id, &rows)?;
        info!(
            "📅 Scheduled {} notification(s) for '{}' [{} {}]",
            rows.len(),
            event.title,
            event.profile,
            event.category
        );
        Ok(inserted)
    }

    /// Remove every pending/claimed row for an event.
    pub fn unschedule(&self, event_id: &str) -> Result<usize> {
        let removed = self.store.delete_for_event(event_id)?;
        info!("📅 Unscheduled {removed} notification(s) for event '{event_id}'");
        Ok(removed)
    }

    /// Pure expansion of an event into notification rows. Past fire-times
    /// beyond the grace window are filtered out here.
    pub fn expand(&self, event: &Event, now: i64) -> Vec<NewNotification> {
        let start = event.start_at.timestamp();
        let end = event.end_at.timestamp();
        let mut rules = self.policy.resolve(&event.profile, &event.category);
        let multi = !event.phases.is_empty() || !event.participants.is_empty();

        // A multi-stage event always gets a day-before reminder and an end
        // notification, even when its category has no policy entry and the
        // lookup fell through to the minimal default.
        if multi && rules == [(Anchor::Start, 0)] {
            rules = vec![(Anchor::Start, 1440), (Anchor::End, 0)];
        }

        // For multi-stage shapes the whole-event rules anchor to the first
        // stage's start and the last phase's end rather than the raw
        // event window.
        let mut start_ref = start;
        let mut end_ref = end;
        if let Some(first) = event.phases.first() {
            start_ref = start + first.start_offset_min * 60;
        }
        if let Some(last) = event.phases.last() {
            end_ref = start + last.end_offset_min * 60;
        }
        if let Some(first) = event.participants.first() {
            start_ref = start + first.unlock_offset_min * 60;
        }

        let mut rows = Vec::new();

        for (anchor, offset) in rules {
            // In the multi-stage shapes the start-anchor rules act as
            // reminders for the event as a whole; the per-stage rows below
            // carry the actual "it began" notifications.
            if multi && anchor == Anchor::Start && offset == 0 {
                continue;
            }
            let anchor_time = match anchor {
                Anchor::Start => start_ref,
                Anchor::End => end_ref,
            };
            rows.push(self.build_row(event, anchor, offset, anchor_time, None, None));
        }

        for phase in &event.phases {
            let at = start + phase.start_offset_min * 60;
            rows.push(self.build_row(event, Anchor::Start, 0, at, Some(&phase.name), None));
        }

        for participant in &event.participants {
            let at = start + participant.unlock_offset_min * 60;
            rows.push(self.build_row(
                event,
                Anchor::Start,
                0,
                at,
                None,
                Some(&participant.name),
            ));
        }

        let cutoff = now - self.grace_window_min * 60;
        let before = rows.len();
        rows.retain(|r| r.fire_at >= cutoff);
        if rows.len() < before {
            debug!(
                "📅 Dropped {} past fire-time(s) for '{}'",
                before - rows.len(),
                event.event_id
            );
        }

        rows.sort_by_key(|r| r.fire_at);
        rows
    }

    fn build_row(
        &self,
        event: &Event,
        anchor: Anchor,
        offset: i64,
        anchor_time: i64,
        phase: Option<&str>,
        sub_item: Option<&str>,
    ) -> NewNotification {
        let kind = match (anchor, offset) {
            (Anchor::Start, 0) => "start",
            (Anchor::Start, _) => "reminder",
            (Anchor::End, _) => "end",
        };
        let template_key =
            self.templates
                .resolve_key(&event.profile, &event.category, kind, phase, sub_item);
        NewNotification {
            event_id: event.event_id.clone(),
            profile: event.profile.clone(),
            category: event.category.clone(),
            title: event.title.clone(),
            anchor,
            offset_minutes: offset,
            fire_at: anchor_time - offset * 60,
            event_time: anchor_time,
            template_key,
            phase: phase.map(str::to_string),
            sub_item: sub_item.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use herald_core::types::{EventParticipant, EventPhase};

    const DAY: i64 = 86_400;

    fn scheduler_with(name: &str, policy: PolicyTable) -> (NotificationScheduler, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("herald-sched-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).ok();
        let store = Arc::new(NotificationStore::open(&dir.join("test.db")).unwrap());
        let sched = NotificationScheduler::new(store, policy, TemplateRegistry::builtin(), 5);
        (sched, dir)
    }

    fn banner_event() -> Event {
        Event {
            event_id: "banner-1".into(),
            profile: "G1".into(),
            category: "Character Banner".into(),
            title: "Spring Banner".into(),
            start_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(),
            phases: Vec::new(),
            participants: Vec::new(),
        }
    }

    #[test]
    fn test_simple_banner_expansion() {
        let (sched, dir) = scheduler_with("banner", PolicyTable::builtin());
        let ev = banner_event();
        let start = ev.start_at.timestamp();
        let end = ev.end_at.timestamp();

        let rows = sched.expand(&ev, start - 10 * DAY);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fire_at, start - DAY);
        assert_eq!(rows[0].template_key, "event_reminder");
        assert_eq!(rows[1].fire_at, end - 1500 * 60);
        assert_eq!(rows[2].fire_at, end - DAY);
        assert_eq!(rows[2].template_key, "character_banner_end");
        assert!(rows.iter().all(|r| r.profile == "G1"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_phased_competition_expansion() {
        let mut policy = PolicyTable::builtin();
        policy.set_profile("G1", "Competition", &[1440], &[0]);
        let (sched, dir) = scheduler_with("phased", policy);

        let mut ev = banner_event();
        ev.event_id = "meeting-1".into();
        ev.category = "Competition".into();
        ev.title = "Taurus Cup".into();
        // Six stages over the event window, two days apart.
        ev.phases = (0..6)
            .map(|i| EventPhase {
                name: if i < 5 {
                    format!("Round {}", i + 1)
                } else {
                    "Finals".into()
                },
                start_offset_min: i * 2 * 1440,
                end_offset_min: (i * 2 + 2) * 1440,
            })
            .collect();

        let start = ev.start_at.timestamp();
        let rows = sched.expand(&ev, start - 10 * DAY);
        // One reminder, six phase starts, one end.
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].fire_at, start - DAY);
        assert_eq!(rows[0].phase, None);

        let phase_rows: Vec<_> = rows.iter().filter(|r| r.phase.is_some()).collect();
        assert_eq!(phase_rows.len(), 6);
        assert_eq!(phase_rows[0].fire_at, start);
        assert_eq!(phase_rows[0].template_key, "g1_competition_phase_round_1");
        assert_eq!(phase_rows[5].phase.as_deref(), Some("Finals"));
        assert_eq!(phase_rows[5].template_key, "g1_competition_phase_finals");

        assert_eq!(rows.last().unwrap().anchor, Anchor::End);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sequential_unlock_expansion() {
        let mut policy = PolicyTable::builtin();
        policy.set_profile("G1", "Legend Race", &[1440], &[0]);
        let (sched, dir) = scheduler_with("seq", policy);

        let mut ev = banner_event();
        ev.event_id = "race-1".into();
        ev.category = "Legend Race".into();
        ev.title = "Legend Race".into();
        ev.participants = ["Teio", "McQueen", "Suzuka", "Rudolf", "Gold Ship"]
            .iter()
            .enumerate()
            .map(|(i, name)| EventParticipant {
                name: name.to_string(),
                unlock_offset_min: i as i64 * 3 * 1440,
            })
            .collect();

        let start = ev.start_at.timestamp();
        let rows = sched.expand(&ev, start - 10 * DAY);
        // One reminder, five unlocks, one end.
        assert_eq!(rows.len(), 7);
        let unlocks: Vec<_> = rows.iter().filter(|r| r.sub_item.is_some()).collect();
        assert_eq!(unlocks.len(), 5);
        assert_eq!(unlocks[0].sub_item.as_deref(), Some("Teio"));
        assert_eq!(unlocks[0].template_key, "g1_legend_race_unlock");
        assert_eq!(unlocks[4].fire_at, start + 12 * DAY);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_phased_expansion_without_policy_entry() {
        // No builtin policy covers "Competition"; the reminder and end
        // rows must still be produced.
        let (sched, dir) = scheduler_with("phased-default", PolicyTable::builtin());

        let mut ev = banner_event();
        ev.event_id = "meeting-2".into();
        ev.category = "Competition".into();
        ev.title = "Gemini Cup".into();
        ev.phases = (0..6)
            .map(|i| EventPhase {
                name: format!("Round {}", i + 1),
                start_offset_min: i * 2 * 1440,
                end_offset_min: (i * 2 + 2) * 1440,
            })
            .collect();

        let start = ev.start_at.timestamp();
        let rows = sched.expand(&ev, start - 10 * DAY);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].fire_at, start - DAY);
        assert_eq!(rows[0].phase, None);
        assert_eq!(rows.last().unwrap().anchor, Anchor::End);
        assert_eq!(rows.last().unwrap().fire_at, start + 12 * DAY);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sequential_expansion_without_policy_entry() {
        let (sched, dir) = scheduler_with("seq-default", PolicyTable::builtin());

        let mut ev = banner_event();
        ev.event_id = "race-2".into();
        ev.category = "Legend Race".into();
        ev.title = "Legend Race".into();
        ev.participants = (0..5)
            .map(|i| EventParticipant {
                name: format!("Runner {}", i + 1),
                unlock_offset_min: i * 3 * 1440,
            })
            .collect();

        let start = ev.start_at.timestamp();
        let end = ev.end_at.timestamp();
        let rows = sched.expand(&ev, start - 10 * DAY);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].fire_at, start - DAY);
        assert_eq!(rows[0].sub_item, None);
        assert_eq!(rows.last().unwrap().anchor, Anchor::End);
        assert_eq!(rows.last().unwrap().fire_at, end);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let (sched, dir) = scheduler_with("idem", PolicyTable::builtin());
        let ev = banner_event();
        let now = ev.start_at.timestamp() - 10 * DAY;

        sched.schedule_event(&ev, now).unwrap();
        sched.schedule_event(&ev, now).unwrap();
        let stored = sched.store.list_for_event(&ev.event_id).unwrap();
        assert_eq!(stored.len(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reschedule_moves_fire_times() {
        let (sched, dir) = scheduler_with("resched", PolicyTable::builtin());
        let mut ev = banner_event();
        let now = ev.start_at.timestamp() - 10 * DAY;
        sched.schedule_event(&ev, now).unwrap();

        // Event slips by two days.
        ev.start_at += chrono::Duration::days(2);
        ev.end_at += chrono::Duration::days(2);
        sched.schedule_event(&ev, now).unwrap();

        let stored = sched.store.list_for_event(&ev.event_id).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].fire_at, ev.start_at.timestamp() - DAY);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_past_fire_times_dropped() {
        let (sched, dir) = scheduler_with("grace", PolicyTable::builtin());
        let ev = banner_event();

        // Scheduling two days into the event drops the start reminder but
        // keeps both end-side rows.
        let now = ev.start_at.timestamp() + 2 * DAY;
        let rows = sched.expand(&ev, now);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.anchor == Anchor::End));

        // Within the grace window the reminder still goes out.
        let now = ev.start_at.timestamp() - DAY + 4 * 60;
        let rows = sched.expand(&ev, now);
        assert_eq!(rows.len(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_invalid_event() {
        let (sched, dir) = scheduler_with("invalid", PolicyTable::builtin());
        let mut ev = banner_event();
        ev.end_at = ev.start_at;
        assert!(sched.schedule_event(&ev, 0).is_err());
        assert!(sched.store.list_for_event(&ev.event_id).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unschedule_clears_pending() {
        let (sched, dir) = scheduler_with("unsched", PolicyTable::builtin());
        let ev = banner_event();
        sched
            .schedule_event(&ev, ev.start_at.timestamp() - 10 * DAY)
            .unwrap();
        assert_eq!(sched.unschedule(&ev.event_id).unwrap(), 3);
        assert!(sched.store.list_for_event(&ev.event_id).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
