//! Event and notification data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HeraldError, Result};

/// A time-bounded game event, owned by an external collaborator (scraper,
/// management API, manual entry). Herald references it, snapshots what it
/// needs, and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Opaque identifier, stable for the event's lifetime.
    pub event_id: String,
    /// Game/community tag, e.g. "G1", "AK". Selects timing and message policy.
    pub profile: String,
    /// Event kind, e.g. "Character Banner", "Story Event", "Competition".
    pub category: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Ordered phases for multi-stage events (competition rounds).
    #[serde(default)]
    pub phases: Vec<EventPhase>,
    /// Ordered participants for sequential-unlock events (race rotations).
    #[serde(default)]
    pub participants: Vec<EventParticipant>,
}

/// A named sub-interval of a multi-stage event. Offsets are minutes from
/// the event start, computed by the event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPhase {
    pub name: String,
    pub start_offset_min: i64,
    pub end_offset_min: i64,
}

/// An individually-unlocking element within a sequential-unlock event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventParticipant {
    pub name: String,
    /// Minutes after event start at which this participant unlocks.
    pub unlock_offset_min: i64,
}

impl Event {
    /// Reject malformed events before any scheduling write happens.
    pub fn validate(&self) -> Result<()> {
        if self.event_id.trim().is_empty() {
            return Err(HeraldError::Validation("event_id is empty".into()));
        }
        if self.profile.trim().is_empty() {
            return Err(HeraldError::Validation("profile is empty".into()));
        }
        if self.category.trim().is_empty() {
            return Err(HeraldError::Validation("category is empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(HeraldError::Validation("title is empty".into()));
        }
        if self.start_at >= self.end_at {
            return Err(HeraldError::Validation(format!(
                "start_at ({}) must be before end_at ({})",
                self.start_at, self.end_at
            )));
        }
        // Names distinguish stage rows from each other; a repeat would
        // silently collapse two notifications into one.
        let mut seen = std::collections::HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.name.as_str()) {
                return Err(HeraldError::Validation(format!(
                    "duplicate phase name '{}'",
                    phase.name
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for participant in &self.participants {
            if !seen.insert(participant.name.as_str()) {
                return Err(HeraldError::Validation(format!(
                    "duplicate participant name '{}'",
                    participant.name
                )));
            }
        }
        Ok(())
    }
}

/// Which event instant a notification offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    Start,
    End,
}

impl Anchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::End => "end",
        }
    }

    pub fn from_str(s: &str) -> Anchor {
        match s {
            "end" => Anchor::End,
            _ => Anchor::Start,
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification lifecycle. Transitions: pending → claimed → sent, or
/// claimed → pending (release on failure or stale-claim timeout). `Sent`
/// is terminal; sent rows are retained as audit trail and never re-claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Pending,
    Claimed,
    Sent,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Claimed => "claimed",
            NotificationStatus::Sent => "sent",
        }
    }

    pub fn from_str(s: &str) -> NotificationStatus {
        match s {
            "claimed" => NotificationStatus::Claimed,
            "sent" => NotificationStatus::Sent,
            _ => NotificationStatus::Pending,
        }
    }
}

/// A scheduled notification row, as read back from the store.
///
/// Profile, category, and title are denormalized snapshots taken at
/// scheduling time so rendering survives deletion of the source event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub event_id: String,
    pub profile: String,
    pub category: String,
    pub title: String,
    pub anchor: Anchor,
    pub offset_minutes: i64,
    /// When this notification becomes due (UNIX seconds, UTC).
    pub fire_at: i64,
    /// The anchor instant this notification refers to (UNIX seconds, UTC).
    pub event_time: i64,
    pub template_key: String,
    pub phase: Option<String>,
    pub sub_item: Option<String>,
    /// When present, delivered verbatim instead of template rendering.
    pub custom_message: Option<String>,
    pub status: NotificationStatus,
    pub claimed_at: Option<i64>,
}

/// A notification to insert, produced by the scheduler. The store assigns
/// the id on insert; new rows are always `pending`.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub event_id: String,
    pub profile: String,
    pub category: String,
    pub title: String,
    pub anchor: Anchor,
    pub offset_minutes: i64,
    pub fire_at: i64,
    pub event_time: i64,
    pub template_key: String,
    pub phase: Option<String>,
    pub sub_item: Option<String>,
}
